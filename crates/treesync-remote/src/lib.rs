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

//! Remote store access: filter construction, the paginated HTTP listing client, and
//! the concurrent tree crawler built on [`treesync_pool::TaskPool`].
//!
//! Layout: `query.rs` (filter grammar), `client.rs` (`DriveClient`), `crawler.rs`
//! (`Crawler`), `error.rs`.

pub mod client;
pub mod crawler;
pub mod error;
pub mod query;

pub use client::{DEFAULT_ENDPOINT, DriveClient, PAGE_SIZE};
pub use crawler::Crawler;
pub use error::{CrawlError, CrawlResult, RemoteError, RemoteResult};
pub use query::DriveQuery;
