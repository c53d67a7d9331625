//! Environment loading and validation.

use std::fmt;
use std::time::Duration;

use treesync_core::EntryId;
use treesync_remote::DEFAULT_ENDPOINT;
use treesync_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};

use crate::error::{ConfigError, ConfigResult};

/// Entries per persistence batch when unset.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Pool drain deadline when unset.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout for remote listings when unset.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// How long a catalog connection attempt may wait when unset.
pub const DEFAULT_DATABASE_TIMEOUT_SECS: u64 = 10;

const ROOT_FOLDER_ID: &str = "TREESYNC_ROOT_FOLDER_ID";
const DATABASE_URL: &str = "DATABASE_URL";
const DRIVE_TOKEN: &str = "TREESYNC_DRIVE_TOKEN";
const DRIVE_ENDPOINT: &str = "TREESYNC_DRIVE_ENDPOINT";
const PARALLELISM: &str = "TREESYNC_PARALLELISM";
const BATCH_SIZE: &str = "TREESYNC_BATCH_SIZE";
const MIME_PREFIX: &str = "TREESYNC_MIME_PREFIX";
const SHUTDOWN_TIMEOUT_SECS: &str = "TREESYNC_SHUTDOWN_TIMEOUT_SECS";
const HTTP_TIMEOUT_SECS: &str = "TREESYNC_HTTP_TIMEOUT_SECS";
const DATABASE_TIMEOUT_SECS: &str = "TREESYNC_DATABASE_TIMEOUT_SECS";
const LOG_LEVEL: &str = "TREESYNC_LOG_LEVEL";
const LOG_FORMAT: &str = "TREESYNC_LOG_FORMAT";

/// Validated settings for one sync pass.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Folder the crawl starts from.
    pub root_folder_id: EntryId,
    /// Postgres connection string.
    pub database_url: String,
    /// Bearer token for the remote store.
    pub drive_token: String,
    /// `files.list` endpoint.
    pub drive_endpoint: String,
    /// Task pool size.
    pub parallelism: usize,
    /// Entries per update or delete batch; never zero.
    pub batch_size: usize,
    /// Only leaves whose MIME type starts with this prefix are reconciled.
    pub mime_prefix: Option<String>,
    /// How long shutdown waits for in-flight tasks.
    pub shutdown_timeout: Duration,
    /// Per-request timeout for remote listings.
    pub http_timeout: Duration,
    /// Upper bound on acquiring a catalog connection.
    pub database_timeout: Duration,
    /// Default log level; `RUST_LOG` overrides it.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("root_folder_id", &self.root_folder_id)
            .field("database_url", &"<redacted>")
            .field("drive_token", &"<redacted>")
            .field("drive_endpoint", &self.drive_endpoint)
            .field("parallelism", &self.parallelism)
            .field("batch_size", &self.batch_size)
            .field("mime_prefix", &self.mime_prefix)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("database_timeout", &self.database_timeout)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl SyncConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] for unset required variables and
    /// [`ConfigError::InvalidField`] for values that fail validation.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load and validate configuration through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] for unset required variables and
    /// [`ConfigError::InvalidField`] for values that fail validation.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingEnv { name });

        let root_folder_id = EntryId::new(require(ROOT_FOLDER_ID)?);
        let database_url = require(DATABASE_URL)?;
        let drive_token = require(DRIVE_TOKEN)?;
        let drive_endpoint = get(DRIVE_ENDPOINT).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !drive_endpoint.starts_with("http://") && !drive_endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidField {
                field: DRIVE_ENDPOINT,
                reason: "not_http_url",
                value: Some(drive_endpoint),
            });
        }

        let parallelism = positive(PARALLELISM, get(PARALLELISM))?
            .unwrap_or_else(treesync_pool::default_parallelism);
        let batch_size = positive(BATCH_SIZE, get(BATCH_SIZE))?.unwrap_or(DEFAULT_BATCH_SIZE);
        let shutdown_timeout = Duration::from_secs(
            seconds(SHUTDOWN_TIMEOUT_SECS, get(SHUTDOWN_TIMEOUT_SECS))?
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        );
        let http_timeout = Duration::from_secs(
            seconds(HTTP_TIMEOUT_SECS, get(HTTP_TIMEOUT_SECS))?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        );
        let database_timeout = Duration::from_secs(
            positive_seconds(DATABASE_TIMEOUT_SECS, get(DATABASE_TIMEOUT_SECS))?
                .unwrap_or(DEFAULT_DATABASE_TIMEOUT_SECS),
        );

        let log_level = get(LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_format = match get(LOG_FORMAT) {
            Some(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidField {
                field: LOG_FORMAT,
                reason: "unknown_format",
                value: Some(raw),
            })?,
            None => LogFormat::infer(),
        };

        Ok(Self {
            root_folder_id,
            database_url,
            drive_token,
            drive_endpoint,
            parallelism,
            batch_size,
            mime_prefix: get(MIME_PREFIX),
            shutdown_timeout,
            http_timeout,
            database_timeout,
            log_level,
            log_format,
        })
    }
}

fn positive(field: &'static str, raw: Option<String>) -> ConfigResult<Option<usize>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidField {
            field,
            reason: "zero",
            value: Some(raw),
        }),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidField {
            field,
            reason: "not_a_positive_integer",
            value: Some(raw),
        }),
    }
}

fn seconds(field: &'static str, raw: Option<String>) -> ConfigResult<Option<u64>> {
    raw.map(|raw| {
        raw.parse::<u64>().map_err(|_| ConfigError::InvalidField {
            field,
            reason: "not_seconds",
            value: Some(raw),
        })
    })
    .transpose()
}

fn positive_seconds(field: &'static str, raw: Option<String>) -> ConfigResult<Option<u64>> {
    match seconds(field, raw.clone())? {
        Some(0) => Err(ConfigError::InvalidField {
            field,
            reason: "zero",
            value: raw,
        }),
        parsed => Ok(parsed),
    }
}
