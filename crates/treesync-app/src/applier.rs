//! Applies a reconciled change set to the record store.
//!
//! Updates and deletes go out in fixed-size batches, best effort: a failing
//! batch is logged and counted, and later batches still run. Inserts are handed
//! to the task pool one by one for enrichment and are not awaited.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};
use treesync_core::{ChangeSet, Enricher, RecordStore, RecordUpdate};
use treesync_pool::TaskPool;
use treesync_telemetry::Metrics;

use crate::error::{AppError, AppResult};

/// Outcome counters for one batched operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Batches sent to the store.
    pub attempted: usize,
    /// Batches the store rejected.
    pub failed: usize,
    /// Records carried by the batches that succeeded.
    pub applied: usize,
}

impl BatchStats {
    fn record(&mut self, size: usize, ok: bool) {
        self.attempted += 1;
        if ok {
            self.applied += size;
        } else {
            self.failed += 1;
        }
    }
}

/// Summary of one [`ChangeApplier::apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Modification-time update batches.
    pub updates: BatchStats,
    /// Delete batches.
    pub deletes: BatchStats,
    /// Inserted entries handed to the pool for enrichment.
    pub inserts_submitted: usize,
    /// Inserted entries the pool refused because it was shutting down.
    pub inserts_rejected: usize,
}

impl ApplyReport {
    /// Whether every batch succeeded and every insert was handed off.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.updates.failed == 0 && self.deletes.failed == 0 && self.inserts_rejected == 0
    }
}

/// Writes change sets to a [`RecordStore`] and schedules enrichment.
#[derive(Clone)]
pub struct ChangeApplier {
    store: Arc<dyn RecordStore>,
    enricher: Arc<dyn Enricher>,
    pool: TaskPool,
    metrics: Metrics,
    batch_size: usize,
}

impl std::fmt::Debug for ChangeApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeApplier")
            .field("batch_size", &self.batch_size)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ChangeApplier {
    /// Build an applier writing batches of at most `batch_size` records.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] when `batch_size` is zero.
    pub fn new(
        store: Arc<dyn RecordStore>,
        enricher: Arc<dyn Enricher>,
        pool: TaskPool,
        metrics: Metrics,
        batch_size: usize,
    ) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::InvalidConfig {
                field: "batch_size",
                reason: "zero",
                value: Some(batch_size.to_string()),
            });
        }
        Ok(Self {
            store,
            enricher,
            pool,
            metrics,
            batch_size,
        })
    }

    /// Maximum records per batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Apply `changes`: batched updates, batched deletes, then enrichment hand-off.
    pub async fn apply(&self, changes: ChangeSet) -> ApplyReport {
        let ChangeSet {
            inserted,
            updated,
            deleted,
            ..
        } = changes;

        let updates: Vec<RecordUpdate> = updated.iter().map(RecordUpdate::from).collect();
        let update_stats = self
            .run_batches("update", updates.as_slice(), |batch| {
                self.store.update_modified_times(batch)
            })
            .await;
        let delete_stats = self
            .run_batches("delete", deleted.as_slice(), |batch| {
                self.store.delete_by_ids(batch)
            })
            .await;

        let mut report = ApplyReport {
            updates: update_stats,
            deletes: delete_stats,
            ..ApplyReport::default()
        };

        for entry in inserted {
            let enricher = Arc::clone(&self.enricher);
            let metrics = self.metrics.clone();
            let id = entry.id().clone();
            let queued = id.clone();
            let submitted = self.pool.submit("enrich", async move {
                let result = enricher
                    .enrich(entry)
                    .await
                    .with_context(|| format!("enrichment failed for {id}"));
                metrics.inc_enrichment(if result.is_ok() { "ok" } else { "failed" });
                result
            });
            match submitted {
                Ok(handle) => {
                    report.inserts_submitted += 1;
                    debug!(task = handle.label(), id = %queued, "insert handed off");
                }
                Err(err) => {
                    report.inserts_rejected += 1;
                    warn!(id = %queued, error = %err, "insert not handed off for enrichment");
                }
            }
        }

        info!(
            update_batches = report.updates.attempted,
            update_batches_failed = report.updates.failed,
            delete_batches = report.deletes.attempted,
            delete_batches_failed = report.deletes.failed,
            inserts_submitted = report.inserts_submitted,
            inserts_rejected = report.inserts_rejected,
            "change set applied"
        );
        report
    }

    async fn run_batches<'a, T, F, Fut>(
        &self,
        operation: &'static str,
        items: &'a [T],
        mut write: F,
    ) -> BatchStats
    where
        T: Sync,
        F: FnMut(&'a [T]) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let mut stats = BatchStats::default();
        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            let outcome = write(batch).await;
            stats.record(batch.len(), outcome.is_ok());
            match outcome {
                Ok(()) => {
                    self.metrics.inc_batch(operation, "ok");
                    debug!(operation, batch = index, size = batch.len(), "batch applied");
                }
                Err(err) => {
                    self.metrics.inc_batch(operation, "failed");
                    warn!(
                        operation,
                        batch = index,
                        size = batch.len(),
                        error = %format!("{err:#}"),
                        "batch failed; continuing with remaining batches"
                    );
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_stats_track_outcomes() {
        let mut stats = BatchStats::default();
        stats.record(100, true);
        stats.record(100, false);
        stats.record(50, true);
        assert_eq!(
            stats,
            BatchStats {
                attempted: 3,
                failed: 1,
                applied: 150,
            }
        );
    }

    #[test]
    fn clean_report_requires_no_failures() {
        let mut report = ApplyReport::default();
        assert!(report.is_clean());
        report.deletes.failed = 1;
        assert!(!report.is_clean());
    }
}
