//! # Design
//!
//! - Pool errors carry the task label or operation that failed, never interpolated into the message.
//! - Branch failures keep the original error so callers can downcast to their own types.

use thiserror::Error;

/// Result alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by the task pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Parallelism degree was not usable.
    #[error("invalid pool parallelism")]
    InvalidParallelism {
        /// Rejected parallelism value.
        value: usize,
    },
    /// The pool no longer accepts work.
    #[error("task pool is shut down")]
    ShutDown {
        /// Operation that was rejected.
        operation: &'static str,
    },
    /// A submitted task returned an error.
    #[error("pool task failed")]
    TaskFailed {
        /// Label supplied at submission.
        label: &'static str,
        /// Error returned by the task.
        source: anyhow::Error,
    },
    /// A submitted task panicked.
    #[error("pool task panicked")]
    TaskPanicked {
        /// Label supplied at submission.
        label: &'static str,
        /// Panic payload rendered as text.
        message: String,
    },
    /// A node of a recursive computation returned an error.
    #[error("recursive branch failed")]
    BranchFailed {
        /// Error returned by the failing node.
        source: anyhow::Error,
    },
    /// A node of a recursive computation panicked or was cancelled.
    #[error("recursive branch aborted")]
    BranchAborted {
        /// Panic payload or cancellation reason rendered as text.
        message: String,
    },
}
