//! # Design
//!
//! - Logging install and metric setup fail once at startup; rendering can fail later.
//! - Metric failures carry the metric name and the setup stage that rejected it.

use std::fmt::{self, Display, Formatter};
use std::string::FromUtf8Error;

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Point in metric setup where Prometheus rejected a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

impl Display for MetricStage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Build => "build",
            Self::Register => "register",
        })
    }
}

/// Errors raised while setting up logging or exporting metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("tracing subscriber could not be installed")]
    SubscriberInstall {
        /// Underlying install error.
        source: TryInitError,
    },
    /// Prometheus rejected a collector.
    #[error("metric setup failed")]
    Metric {
        /// Metric name.
        name: &'static str,
        /// Setup stage that failed.
        stage: MetricStage,
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// The registry could not be rendered in text exposition format.
    #[error("metrics exposition failed")]
    Exposition {
        /// Underlying Prometheus error.
        source: prometheus::Error,
    },
    /// Rendered exposition text was not UTF-8.
    #[error("metrics exposition was not utf-8")]
    ExpositionEncoding {
        /// Underlying conversion error.
        source: FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn metric(
        name: &'static str,
        stage: MetricStage,
        source: prometheus::Error,
    ) -> Self {
        Self::Metric {
            name,
            stage,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn metric_errors_name_the_stage() {
        let err = TelemetryError::metric(
            "treesync_changes_total",
            MetricStage::Register,
            prometheus::Error::AlreadyReg,
        );
        assert_eq!(err.to_string(), "metric setup failed");
        assert!(err.source().is_some());
        assert!(matches!(
            err,
            TelemetryError::Metric {
                name: "treesync_changes_total",
                stage: MetricStage::Register,
                ..
            }
        ));
        assert_eq!(MetricStage::Build.to_string(), "build");
    }

    #[test]
    fn exposition_errors_keep_their_source() -> std::result::Result<(), Box<dyn Error>> {
        let Err(utf8) = String::from_utf8(vec![0, 159]) else {
            return Err("expected invalid utf-8".into());
        };
        let err = TelemetryError::ExpositionEncoding { source: utf8 };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
        assert!(err.source().is_some());

        let err = TelemetryError::Exposition {
            source: prometheus::Error::Msg("encode".to_string()),
        };
        assert_eq!(err.to_string(), "metrics exposition failed");
        Ok(())
    }
}
