//! Throwaway Postgres databases for integration tests.
//!
//! A server named by `TREESYNC_TEST_DATABASE_URL` is used when set. Otherwise a
//! private server is started from locally installed binaries. Each call to
//! [`start_postgres`] gets its own database, dropped again (with any private
//! server) when the handle goes out of scope.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::NoTls;
use url::Url;

/// Environment variable naming the server used by database tests.
pub const TEST_DATABASE_URL_ENV: &str = "TREESYNC_TEST_DATABASE_URL";

/// Handle to a database created for one test.
#[derive(Debug)]
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    database: String,
    server: Option<LocalServer>,
}

#[derive(Debug)]
struct LocalServer {
    process: Child,
    data_dir: PathBuf,
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        let _ = fs::remove_dir_all(&self.data_dir);
    }
}

impl TestDatabase {
    /// Connection string that can be passed to `sqlx` or other Postgres clients.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.database);
        // Runs before `server` is dropped, so the private server is still up.
        let _ = run_admin_statement(&self.admin_url, statement);
    }
}

/// Create a uniquely named test database.
///
/// Uses the server named by `TREESYNC_TEST_DATABASE_URL` when set, otherwise
/// starts a private server with `initdb` and `postgres`. Returns `Ok(None)` when
/// the variable is unset and those binaries cannot be found.
///
/// # Errors
///
/// Returns an error when the URL is malformed, the private server fails to
/// start, or the database cannot be created.
pub fn start_postgres() -> Result<Option<TestDatabase>> {
    match std::env::var(TEST_DATABASE_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => create_unique_database(&url).map(Some),
        _ => start_local_postgres(),
    }
}

fn start_local_postgres() -> Result<Option<TestDatabase>> {
    let Some(binaries) = PostgresBinaries::locate() else {
        return Ok(None);
    };
    let port = reserve_port()?;
    let data_dir = create_data_dir()?;
    let data_path = data_dir
        .to_str()
        .context("data dir contains non-utf8 characters")?;

    let initdb = Command::new(&binaries.initdb)
        .args(["-D", data_path, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !initdb.success() {
        let _ = fs::remove_dir_all(&data_dir);
        bail!("initdb exited with {initdb}");
    }

    let process = Command::new(&binaries.postgres)
        .args(["-D", data_path, "-p", &port.to_string(), "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres process")?;
    let server = LocalServer { process, data_dir };

    wait_for_ready(&binaries.pg_isready, port)?;

    let mut database =
        create_unique_database(&format!("postgres://postgres@127.0.0.1:{port}/postgres"))?;
    database.server = Some(server);
    Ok(Some(database))
}

struct PostgresBinaries {
    initdb: PathBuf,
    postgres: PathBuf,
    pg_isready: PathBuf,
}

impl PostgresBinaries {
    fn locate() -> Option<Self> {
        let dirs = search_dirs();
        let find = |name: &str| {
            dirs.iter()
                .map(|dir| dir.join(name))
                .find(|candidate| candidate.is_file())
        };
        Some(Self {
            initdb: find("initdb")?,
            postgres: find("postgres")?,
            pg_isready: find("pg_isready")?,
        })
    }
}

// Server installs first so `initdb` finds its share files.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/opt/homebrew/opt/postgresql@16/bin"),
        PathBuf::from("/usr/local/opt/postgresql@16/bin"),
    ];
    if let Ok(versions) = fs::read_dir("/usr/lib/postgresql") {
        let mut found: Vec<PathBuf> = versions
            .filter_map(|entry| entry.ok().map(|entry| entry.path().join("bin")))
            .collect();
        // Newest major version first.
        found.sort_unstable();
        found.reverse();
        dirs.extend(found);
    }
    dirs.extend(
        std::env::var_os("PATH")
            .map_or_else(Vec::new, |paths| std::env::split_paths(&paths).collect()),
    );
    dirs.extend([
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ]);
    dirs
}

fn reserve_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    Ok(listener
        .local_addr()
        .context("failed to read listener address")?
        .port())
}

fn create_data_dir() -> Result<PathBuf> {
    let base = std::env::temp_dir().join("treesync-postgres");
    fs::create_dir_all(&base)
        .with_context(|| format!("failed to create base dir {}", base.display()))?;
    let candidate = base.join(unique_database_name());
    fs::create_dir(&candidate)
        .with_context(|| format!("failed to create data dir {}", candidate.display()))?;
    Ok(candidate)
}

fn wait_for_ready(pg_isready: &Path, port: u16) -> Result<()> {
    for _ in 0..30 {
        let ready = Command::new(pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port.to_string(), "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if ready {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(200));
    }
    bail!("postgres did not become ready on port {port}")
}

fn create_unique_database(base_url: &str) -> Result<TestDatabase> {
    let parsed = Url::parse(base_url).context("invalid postgres connection url")?;
    let database = unique_database_name();

    let mut database_url = parsed.clone();
    database_url.set_path(&format!("/{database}"));

    let mut last_error = None;
    for admin_url in admin_urls(&parsed) {
        match run_admin_statement(&admin_url, format!("CREATE DATABASE \"{database}\"")) {
            Ok(()) => {
                return Ok(TestDatabase {
                    connection_string: database_url.to_string(),
                    admin_url,
                    database,
                    server: None,
                });
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("failed to create test database")))
}

fn admin_urls(base: &Url) -> Vec<String> {
    let mut admin = base.clone();
    admin.set_path("/postgres");
    let mut urls = vec![admin.to_string()];
    if admin.path() != base.path() {
        urls.push(base.to_string());
    }
    urls
}

// The sync client owns its own runtime, so it runs off the test's async thread.
fn run_admin_statement(admin_url: &str, statement: String) -> Result<()> {
    let admin = admin_url.to_string();
    std::thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&admin)?;
        let mut client = config.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .with_context(|| format!("failed to run `{statement}`"))
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin statement thread panicked")))
}

static DATABASE_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_database_name() -> String {
    let sequence = DATABASE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("treesync_test_{}_{sequence}_{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_urls_prefer_maintenance_database() -> Result<()> {
        let base = Url::parse("postgres://user:pw@localhost:5432/app")?;
        let urls = admin_urls(&base);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("/postgres"));
        assert!(urls[1].ends_with("/app"));
        Ok(())
    }

    #[test]
    fn search_dirs_include_path_entries() {
        let dirs = search_dirs();
        assert!(dirs.contains(&PathBuf::from("/usr/local/bin")));
        if let Some(first) = std::env::var_os("PATH")
            .and_then(|paths| std::env::split_paths(&paths).next())
        {
            assert!(dirs.contains(&first));
        }
    }

    #[test]
    fn data_dirs_are_fresh_and_removable() -> Result<()> {
        let first = create_data_dir()?;
        let second = create_data_dir()?;
        assert_ne!(first, second);
        assert!(first.is_dir());
        fs::remove_dir_all(&first)?;
        fs::remove_dir_all(&second)?;
        Ok(())
    }

    #[test]
    fn reserved_ports_are_nonzero() -> Result<()> {
        assert_ne!(reserve_port()?, 0);
        Ok(())
    }

    #[test]
    fn database_names_are_unique_and_prefixed() {
        let first = unique_database_name();
        let second = unique_database_name();
        assert!(first.starts_with("treesync_test_"));
        assert_ne!(first, second);
    }
}
