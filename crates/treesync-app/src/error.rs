//! # Design
//!
//! - Centralize application-level errors for bootstrap and the sync pass.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: treesync_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: treesync_telemetry::TelemetryError,
    },
    /// Database setup failed.
    #[error("database operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: treesync_data::DataError,
    },
    /// Remote client setup failed.
    #[error("remote client operation failed")]
    Remote {
        /// Operation identifier.
        operation: &'static str,
        /// Source remote error.
        source: treesync_remote::RemoteError,
    },
    /// Task pool construction failed.
    #[error("task pool operation failed")]
    Pool {
        /// Operation identifier.
        operation: &'static str,
        /// Source pool error.
        source: treesync_pool::PoolError,
    },
    /// The crawl was abandoned.
    #[error("remote crawl failed")]
    Crawl {
        /// Source crawl error.
        source: treesync_remote::CrawlError,
    },
    /// Reconciliation inputs violated their contract.
    #[error("reconciliation failed")]
    Reconcile {
        /// Source reconciliation error.
        source: treesync_core::ReconcileError,
    },
    /// The record store failed outside of batched writes.
    #[error("record store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: anyhow::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: treesync_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: treesync_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: treesync_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) const fn remote(
        operation: &'static str,
        source: treesync_remote::RemoteError,
    ) -> Self {
        Self::Remote { operation, source }
    }

    pub(crate) const fn pool(operation: &'static str, source: treesync_pool::PoolError) -> Self {
        Self::Pool { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Store { operation, source }
    }
}

/// Render `err` and its chain of sources as one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
