#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Storage-agnostic model and reconciliation logic for remote tree sync.
//!
//! Layout: `model/` (entries, records, change sets), `reconcile.rs`
//! (three-way diff), `service/` (listing, store, and enrichment traits).

pub mod error;
pub mod model;
pub mod reconcile;
pub mod service;

pub use error::{ReconcileError, ReconcileResult};
pub use model::{
    ChangeSet, ChangeSummary, EntryId, EntryKind, FOLDER_MIME_TYPE, ListPage, PATH_SEPARATOR,
    PathedEntry, PersistedRecord, RecordUpdate, RemoteEntry, join_path,
};
pub use reconcile::reconcile;
pub use service::{Enricher, RecordStore, RemoteListing};
