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

//! Startup configuration for the sync pass.
//!
//! Every setting is read from the environment exactly once and validated into a
//! [`SyncConfig`]; nothing downstream reads the environment again.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    DEFAULT_BATCH_SIZE, DEFAULT_DATABASE_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS, SyncConfig,
};
