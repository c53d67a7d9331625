//! # Design
//!
//! - Reconciliation is pure, so the only failures are contract violations in its input.
//! - Messages stay constant; the offending identifier travels as a field.

use thiserror::Error;

use crate::model::EntryId;

/// Result alias for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Contract violations detected while reconciling remote and persisted sets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The remote listing reported the same identifier more than once.
    #[error("duplicate identifier in remote set")]
    DuplicateRemoteId {
        /// Identifier that appeared more than once.
        id: EntryId,
    },
    /// The persisted record set contained the same identifier more than once.
    #[error("duplicate identifier in persisted set")]
    DuplicatePersistedId {
        /// Identifier that appeared more than once.
        id: EntryId,
    },
}
