use std::sync::Arc;

use tracing::{debug, error, info, warn};
use treesync_config::SyncConfig;
use treesync_data::FileStore;
use treesync_pool::{ShutdownOutcome, TaskPool};
use treesync_remote::DriveClient;
use treesync_telemetry::{LoggingConfig, Metrics, build_sha, init_logging};

use crate::enrich::CatalogEnricher;
use crate::error::{AppError, AppResult, error_chain};
use crate::pipeline::{SyncDependencies, SyncService};

const MAX_DATABASE_CONNECTIONS: u32 = 16;

/// Entry point for the treesync boot sequence: load configuration, run one pass.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a dependency cannot be built,
/// or the pass fails fatally.
pub async fn run_app() -> AppResult<()> {
    let config =
        SyncConfig::from_env().map_err(|err| AppError::config("sync_config.from_env", err))?;
    run_app_with(&config).await
}

/// Boot sequence driven entirely by an already validated configuration.
///
/// # Errors
///
/// Returns an error if a dependency cannot be built or the pass fails fatally.
pub async fn run_app_with(config: &SyncConfig) -> AppResult<()> {
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: config.log_format,
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(
        root_id = %config.root_folder_id,
        parallelism = config.parallelism,
        batch_size = config.batch_size,
        mime_prefix = config.mime_prefix.as_deref().unwrap_or(""),
        "treesync bootstrap starting"
    );

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

    let max_connections = u32::try_from(config.parallelism)
        .unwrap_or(MAX_DATABASE_CONNECTIONS)
        .clamp(2, MAX_DATABASE_CONNECTIONS);
    let db = treesync_data::connect(
        &config.database_url,
        max_connections,
        config.database_timeout,
    )
    .await
        .map_err(|err| AppError::data("database.connect", err))?;
    let store = Arc::new(
        FileStore::new(db.clone())
            .await
            .map_err(|err| AppError::data("file_store.new", err))?,
    );

    let listing = Arc::new(
        DriveClient::new(
            config.drive_endpoint.clone(),
            config.drive_token.clone(),
            config.http_timeout,
        )
        .map_err(|err| AppError::remote("drive_client.new", err))?,
    );
    info!(endpoint = listing.endpoint(), "remote listing client ready");

    let pool =
        TaskPool::new(config.parallelism).map_err(|err| AppError::pool("task_pool.new", err))?;

    let service = SyncService::new(
        config.root_folder_id.clone(),
        config.mime_prefix.clone(),
        config.batch_size,
        SyncDependencies {
            listing,
            store: store.clone(),
            enricher: Arc::new(CatalogEnricher::new(store)),
            pool: pool.clone(),
            metrics: metrics.clone(),
        },
    )?;

    let outcome = service.run_once().await;

    match pool.shutdown(config.shutdown_timeout).await {
        ShutdownOutcome::TimedOut { pending } => {
            warn!(pending, "enrichment tasks abandoned at shutdown");
        }
        ShutdownOutcome::Drained | ShutdownOutcome::AlreadyShutDown => {}
    }
    db.close().await;

    match outcome {
        Ok(report) => {
            let snapshot = metrics.snapshot();
            info!(
                crawled = report.crawled,
                filtered_out = report.filtered_out,
                inserted = report.changes.inserted,
                updated = report.changes.updated,
                deleted = report.changes.deleted,
                unchanged = report.changes.unchanged,
                failed_batches = snapshot.failed_batches_total,
                enrichment_failures = snapshot.enrichment_failures_total,
                "sync pass complete"
            );
            match metrics.render() {
                Ok(exposition) => debug!(metrics = %exposition, "final metrics"),
                Err(err) => warn!(error = %err, "metrics could not be rendered"),
            }
            Ok(())
        }
        Err(err) => {
            error!(error = %error_chain(&err), "sync pass failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_config::ConfigError;

    #[tokio::test]
    async fn unreachable_database_is_a_fatal_error() -> Result<(), Box<dyn std::error::Error>> {
        let config = SyncConfig::from_lookup(|name| {
            match name {
                "TREESYNC_ROOT_FOLDER_ID" => Some("root"),
                "DATABASE_URL" => Some("postgres://treesync@127.0.0.1:1/none"),
                "TREESYNC_DRIVE_TOKEN" => Some("token"),
                "TREESYNC_LOG_FORMAT" => Some("json"),
                "TREESYNC_DATABASE_TIMEOUT_SECS" => Some("1"),
                _ => None,
            }
            .map(str::to_string)
        })?;

        let started = std::time::Instant::now();
        let result = run_app_with(&config).await;
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(AppError::Data {
                operation: "database.connect",
                ..
            }) | Err(AppError::Telemetry { .. })
        ));
        Ok(())
    }

    #[test]
    fn config_errors_keep_their_variable() {
        let err = AppError::config(
            "sync_config.from_env",
            ConfigError::MissingEnv {
                name: "TREESYNC_ROOT_FOLDER_ID",
            },
        );
        assert!(matches!(
            err,
            AppError::Config {
                source: ConfigError::MissingEnv {
                    name: "TREESYNC_ROOT_FOLDER_ID"
                },
                ..
            }
        ));
    }
}
