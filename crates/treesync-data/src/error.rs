//! # Design
//!
//! - Every statement failure names the statement it came from.
//! - Rows that cannot be represented in the domain model are reported, not clamped.

use thiserror::Error;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the file catalog.
#[derive(Debug, Error)]
pub enum DataError {
    /// Embedded migrations could not be applied.
    #[error("catalog migration failed")]
    Migrate {
        /// Underlying migration error.
        source: sqlx::migrate::MigrateError,
    },
    /// A statement or connection attempt failed.
    #[error("catalog query failed")]
    Query {
        /// Statement identifier.
        operation: &'static str,
        /// Underlying SQL error.
        source: sqlx::Error,
    },
    /// A stored column holds a negative value where only non-negative ones are valid.
    #[error("catalog column holds a negative value")]
    NegativeColumn {
        /// Column name.
        column: &'static str,
        /// Stored value.
        value: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn query_errors_carry_the_statement() {
        let err = DataError::Query {
            operation: "files.delete",
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(err.to_string(), "catalog query failed");
        assert!(err.source().is_some());
    }

    #[test]
    fn negative_columns_have_no_source() {
        let err = DataError::NegativeColumn {
            column: "size",
            value: -1,
        };
        assert_eq!(err.to_string(), "catalog column holds a negative value");
        assert!(err.source().is_none());
    }

    #[test]
    fn migration_errors_wrap_the_migrator() {
        let err = DataError::Migrate {
            source: sqlx::migrate::MigrateError::VersionMissing(1),
        };
        assert_eq!(err.to_string(), "catalog migration failed");
        assert!(err.source().is_some());
    }
}
