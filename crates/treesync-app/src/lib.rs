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

//! treesync application wiring.
//!
//! Layout: `pipeline.rs` (one sync pass), `applier.rs` (batched persistence and
//! enrichment hand-off), `enrich.rs` (default enricher), `bootstrap.rs`
//! (environment wiring).

/// Batched application of change sets.
pub mod applier;
/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Default enrichment step.
pub mod enrich;
/// Application-level errors.
pub mod error;
/// Crawl, reconcile, apply.
pub mod pipeline;

pub use applier::{ApplyReport, BatchStats, ChangeApplier};
pub use bootstrap::{run_app, run_app_with};
pub use enrich::CatalogEnricher;
pub use error::{AppError, AppResult};
pub use pipeline::{SyncDependencies, SyncReport, SyncService};
