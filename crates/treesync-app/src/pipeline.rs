//! One sync pass: crawl the remote tree, reconcile against the catalog, apply.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};
use treesync_core::{
    ChangeSummary, EntryId, Enricher, PathedEntry, RecordStore, RemoteListing, reconcile,
};
use treesync_pool::TaskPool;
use treesync_remote::Crawler;
use treesync_telemetry::Metrics;

use crate::applier::{ApplyReport, ChangeApplier};
use crate::error::{AppError, AppResult};

/// Collaborators a [`SyncService`] runs against.
#[derive(Clone)]
pub struct SyncDependencies {
    /// Remote tree listing.
    pub listing: Arc<dyn RemoteListing>,
    /// Persisted catalog.
    pub store: Arc<dyn RecordStore>,
    /// Downstream processing for inserted leaves.
    pub enricher: Arc<dyn Enricher>,
    /// Shared pool for crawling and enrichment.
    pub pool: TaskPool,
    /// Metrics registry.
    pub metrics: Metrics,
}

/// Counters describing one completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Leaves returned by the crawl.
    pub crawled: usize,
    /// Leaves dropped by the MIME prefix filter.
    pub filtered_out: usize,
    /// Reconciliation outcome.
    pub changes: ChangeSummary,
    /// Persistence outcome.
    pub applied: ApplyReport,
}

/// Runs sync passes for one root folder.
pub struct SyncService {
    root_id: EntryId,
    mime_prefix: Option<String>,
    crawler: Crawler<dyn RemoteListing>,
    store: Arc<dyn RecordStore>,
    applier: ChangeApplier,
    metrics: Metrics,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("root_id", &self.root_id)
            .field("mime_prefix", &self.mime_prefix)
            .field("applier", &self.applier)
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Build a service syncing the tree under `root_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] when `batch_size` is zero.
    pub fn new(
        root_id: EntryId,
        mime_prefix: Option<String>,
        batch_size: usize,
        deps: SyncDependencies,
    ) -> AppResult<Self> {
        let SyncDependencies {
            listing,
            store,
            enricher,
            pool,
            metrics,
        } = deps;
        let applier = ChangeApplier::new(
            Arc::clone(&store),
            enricher,
            pool.clone(),
            metrics.clone(),
            batch_size,
        )?;
        Ok(Self {
            root_id,
            mime_prefix,
            crawler: Crawler::new(listing, pool),
            store,
            applier,
            metrics,
        })
    }

    /// Run one pass.
    ///
    /// Inserts are handed to the pool and may still be running when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Crawl`] when any folder listing fails,
    /// [`AppError::Store`] when persisted records cannot be loaded, and
    /// [`AppError::Reconcile`] on duplicate identifiers. Batch and enrichment
    /// failures are not errors; they are counted in the report.
    #[instrument(name = "sync_pass", skip(self), fields(root_id = %self.root_id))]
    pub async fn run_once(&self) -> AppResult<SyncReport> {
        let started = Instant::now();
        let crawled = self
            .crawler
            .crawl(&self.root_id)
            .await
            .map_err(|source| AppError::Crawl { source })?;
        self.metrics.observe_crawl(crawled.len(), started.elapsed());
        let crawled_count = crawled.len();

        let remote = filter_by_mime_prefix(crawled, self.mime_prefix.as_deref());
        let filtered_out = crawled_count - remote.len();

        let persisted = self
            .store
            .list_known_leaves()
            .await
            .map_err(|source| AppError::store("record_store.list_known_leaves", source))?;

        let changes =
            reconcile(remote, &persisted).map_err(|source| AppError::Reconcile { source })?;
        let summary = changes.summary();
        self.metrics.add_changes("inserted", summary.inserted);
        self.metrics.add_changes("updated", summary.updated);
        self.metrics.add_changes("deleted", summary.deleted);
        self.metrics.add_changes("unchanged", summary.unchanged);
        info!(
            crawled = crawled_count,
            filtered_out,
            persisted = persisted.len(),
            to_insert = summary.inserted,
            to_update = summary.updated,
            to_delete = summary.deleted,
            unchanged = summary.unchanged,
            "reconciliation complete"
        );

        let applied = self.applier.apply(changes).await;
        Ok(SyncReport {
            crawled: crawled_count,
            filtered_out,
            changes: summary,
            applied,
        })
    }
}

/// Keep leaves whose MIME type starts with `prefix`; with no prefix keep all.
fn filter_by_mime_prefix(entries: Vec<PathedEntry>, prefix: Option<&str>) -> Vec<PathedEntry> {
    let Some(prefix) = prefix else {
        return entries;
    };
    entries
        .into_iter()
        .filter(|entry| {
            entry
                .entry
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with(prefix))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::RemoteEntry;

    fn leaf(id: &str, mime: Option<&str>) -> PathedEntry {
        let entry = RemoteEntry::leaf(id, id, 1, 1);
        let entry = match mime {
            Some(mime) => entry.with_mime_type(mime),
            None => entry,
        };
        PathedEntry::under("", entry)
    }

    #[test]
    fn mime_filter_keeps_matching_prefixes() {
        let entries = vec![
            leaf("a", Some("video/mp4")),
            leaf("b", Some("text/plain")),
            leaf("c", None),
            leaf("d", Some("video/x-matroska")),
        ];
        let kept = filter_by_mime_prefix(entries.clone(), Some("video/"));
        let ids: Vec<&str> = kept.iter().map(|entry| entry.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);

        assert_eq!(filter_by_mime_prefix(entries, None).len(), 4);
    }

    #[test]
    fn report_serialises_for_structured_output() -> Result<(), serde_json::Error> {
        let report = SyncReport {
            crawled: 4,
            filtered_out: 1,
            changes: ChangeSummary {
                inserted: 1,
                updated: 1,
                deleted: 0,
                unchanged: 1,
            },
            applied: ApplyReport::default(),
        };
        let value = serde_json::to_value(report)?;
        assert_eq!(value["crawled"], 4);
        assert_eq!(value["changes"]["inserted"], 1);
        assert_eq!(value["applied"]["inserts_rejected"], 0);
        Ok(())
    }
}
