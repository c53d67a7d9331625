//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges a sync pass reports: change counts, batch
//!   outcomes, enrichment outcomes, and crawl size.

use std::sync::Arc;
use std::time::Duration;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{MetricStage, Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

struct MetricsInner {
    registry: Registry,
    changes_total: IntCounterVec,
    batches_total: IntCounterVec,
    enrichment_total: IntCounterVec,
    crawl_leaves: IntGauge,
    crawl_duration_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for end-of-pass reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Leaves returned by the latest crawl.
    pub crawl_leaves: i64,
    /// Duration of the latest crawl (ms).
    pub crawl_duration_ms: i64,
    /// Inserted entries classified so far.
    pub inserted_total: u64,
    /// Updated entries classified so far.
    pub updated_total: u64,
    /// Deleted entries classified so far.
    pub deleted_total: u64,
    /// Unchanged entries classified so far.
    pub unchanged_total: u64,
    /// Batches that failed, across operations.
    pub failed_batches_total: u64,
    /// Enrichment tasks that failed.
    pub enrichment_failures_total: u64,
}

const CHANGE_KINDS: [&str; 4] = ["inserted", "updated", "deleted", "unchanged"];
const BATCH_OPERATIONS: [&str; 2] = ["update", "delete"];

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let changes_total = IntCounterVec::new(
            Opts::new(
                "treesync_changes_total",
                "Entries classified by reconciliation, by kind",
            ),
            &["kind"],
        )
        .map_err(collector_err("treesync_changes_total"))?;
        let batches_total = IntCounterVec::new(
            Opts::new(
                "treesync_batches_total",
                "Persistence batches attempted, by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(collector_err("treesync_batches_total"))?;
        let enrichment_total = IntCounterVec::new(
            Opts::new(
                "treesync_enrichment_total",
                "Enrichment tasks by outcome",
            ),
            &["outcome"],
        )
        .map_err(collector_err("treesync_enrichment_total"))?;
        let crawl_leaves = IntGauge::with_opts(Opts::new(
            "treesync_crawl_leaves",
            "Leaves returned by the latest crawl",
        ))
        .map_err(collector_err("treesync_crawl_leaves"))?;
        let crawl_duration_ms = IntGauge::with_opts(Opts::new(
            "treesync_crawl_duration_ms",
            "Duration of the latest crawl (ms)",
        ))
        .map_err(collector_err("treesync_crawl_duration_ms"))?;

        register(&registry, "treesync_changes_total", &changes_total)?;
        register(&registry, "treesync_batches_total", &batches_total)?;
        register(&registry, "treesync_enrichment_total", &enrichment_total)?;
        register(&registry, "treesync_crawl_leaves", &crawl_leaves)?;
        register(&registry, "treesync_crawl_duration_ms", &crawl_duration_ms)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                changes_total,
                batches_total,
                enrichment_total,
                crawl_leaves,
                crawl_duration_ms,
            }),
        })
    }

    /// Add `count` entries of the given change kind.
    pub fn add_changes(&self, kind: &str, count: usize) {
        self.inner
            .changes_total
            .with_label_values(&[kind])
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Count one persistence batch for `operation` with `outcome` (`ok` or `failed`).
    pub fn inc_batch(&self, operation: &str, outcome: &str) {
        self.inner
            .batches_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Count one enrichment task with `outcome` (`ok` or `failed`).
    pub fn inc_enrichment(&self, outcome: &str) {
        self.inner
            .enrichment_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the size and duration of the latest crawl.
    pub fn observe_crawl(&self, leaves: usize, duration: Duration) {
        self.inner
            .crawl_leaves
            .set(i64::try_from(leaves).unwrap_or(i64::MAX));
        self.inner
            .crawl_duration_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Exposition { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::ExpositionEncoding { source })
    }

    /// Take a point-in-time snapshot of the sync counters and gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let change = |kind: &str| self.inner.changes_total.with_label_values(&[kind]).get();
        let [inserted, updated, deleted, unchanged] = CHANGE_KINDS;
        MetricsSnapshot {
            crawl_leaves: self.inner.crawl_leaves.get(),
            crawl_duration_ms: self.inner.crawl_duration_ms.get(),
            inserted_total: change(inserted),
            updated_total: change(updated),
            deleted_total: change(deleted),
            unchanged_total: change(unchanged),
            failed_batches_total: BATCH_OPERATIONS
                .iter()
                .map(|operation| {
                    self.inner
                        .batches_total
                        .with_label_values(&[*operation, "failed"])
                        .get()
                })
                .sum(),
            enrichment_failures_total: self
                .inner
                .enrichment_total
                .with_label_values(&["failed"])
                .get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn collector_err(name: &'static str) -> impl FnOnce(prometheus::Error) -> TelemetryError {
    move |source| TelemetryError::metric(name, MetricStage::Build, source)
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::metric(name, MetricStage::Register, source))
}
