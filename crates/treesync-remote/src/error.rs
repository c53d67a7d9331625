//! # Design
//!
//! - Listing transport and decode failures are typed so callers can tell them apart.
//! - Crawl failures name the branch (folder id and path) that aborted the walk.
//! - Messages stay constant; context travels in fields.

use thiserror::Error;
use treesync_core::EntryId;
use treesync_pool::PoolError;

/// Result alias for listing client operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result alias for crawls.
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Errors raised by the remote listing client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Building the HTTP client failed.
    #[error("remote client construction failed")]
    ClientBuild {
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The HTTP request could not be completed.
    #[error("remote request failed")]
    Http {
        /// Operation identifier.
        operation: &'static str,
        /// Folder whose children were requested.
        parent_id: EntryId,
        /// Underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The store answered with a non-success status.
    #[error("remote response status error")]
    HttpStatus {
        /// Operation identifier.
        operation: &'static str,
        /// Folder whose children were requested.
        parent_id: EntryId,
        /// HTTP status code returned by the store.
        status: u16,
    },
    /// The response body was not a valid listing page.
    #[error("remote response decode failed")]
    Decode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A field in the listing page held an unusable value.
    #[error("remote response field invalid")]
    InvalidField {
        /// Entry the field belongs to.
        id: String,
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Errors that abort a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Listing a folder failed; the whole crawl is abandoned.
    #[error("folder listing failed")]
    Listing {
        /// Folder whose listing failed.
        folder_id: EntryId,
        /// Path of the folder relative to the crawl root.
        path: String,
        /// Listing failure.
        source: anyhow::Error,
    },
    /// The task pool could not run the crawl.
    #[error("crawl scheduling failed")]
    Pool {
        /// Underlying pool error.
        source: PoolError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn json_error() -> serde_json::Error {
        match serde_json::from_str::<serde_json::Value>("{") {
            Ok(_) => unreachable!("invalid json parsed"),
            Err(err) => err,
        }
    }

    #[test]
    fn remote_error_messages_are_constant() {
        let status = RemoteError::HttpStatus {
            operation: "files.list",
            parent_id: EntryId::from("root"),
            status: 503,
        };
        assert_eq!(status.to_string(), "remote response status error");
        assert!(status.source().is_none());

        let decode = RemoteError::Decode {
            source: json_error(),
        };
        assert_eq!(decode.to_string(), "remote response decode failed");
        assert!(decode.source().is_some());

        let field = RemoteError::InvalidField {
            id: "abc".to_string(),
            field: "size",
            value: "lots".to_string(),
        };
        assert_eq!(field.to_string(), "remote response field invalid");
    }

    #[test]
    fn crawl_error_keeps_branch_context() {
        let err = CrawlError::Listing {
            folder_id: EntryId::from("f2"),
            path: "F1/F2".to_string(),
            source: anyhow::anyhow!("timeout"),
        };
        assert_eq!(err.to_string(), "folder listing failed");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("timeout")
        );

        let pool = CrawlError::Pool {
            source: PoolError::ShutDown {
                operation: "invoke_recursive",
            },
        };
        assert_eq!(pool.to_string(), "crawl scheduling failed");
    }
}
