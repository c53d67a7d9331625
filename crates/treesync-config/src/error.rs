//! # Design
//!
//! - Configuration failures are fatal at startup and name the variable at fault.
//! - Messages stay constant; the offending value travels in a field.

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing required environment variable")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },
    /// A variable held a value that failed validation.
    #[error("invalid configuration field")]
    InvalidField {
        /// Variable name.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_are_constant() {
        let missing = ConfigError::MissingEnv {
            name: "DATABASE_URL",
        };
        assert_eq!(missing.to_string(), "missing required environment variable");

        let invalid = ConfigError::InvalidField {
            field: "TREESYNC_BATCH_SIZE",
            reason: "zero",
            value: Some("0".to_string()),
        };
        assert_eq!(invalid.to_string(), "invalid configuration field");
    }
}
