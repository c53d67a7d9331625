//! Default enrichment: accept newly discovered leaves into the catalog.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use treesync_core::{Enricher, PathedEntry, RecordStore};

/// Enricher that records each new leaf in the [`RecordStore`].
///
/// Fetching richer metadata for a leaf belongs to a separate enricher; this one
/// only makes the leaf known so the next pass does not report it again.
#[derive(Clone)]
pub struct CatalogEnricher {
    store: Arc<dyn RecordStore>,
}

impl CatalogEnricher {
    /// Enricher writing into `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Enricher for CatalogEnricher {
    async fn enrich(&self, entry: PathedEntry) -> Result<()> {
        let record = entry.to_record();
        self.store
            .insert_record(&record)
            .await
            .with_context(|| format!("failed to accept {} into the catalog", entry.path))?;
        debug!(
            id = %record.id,
            kind = entry.entry.kind.as_str(),
            path = %entry.path,
            "leaf accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesync_core::RemoteEntry;
    use treesync_test_support::mocks::MemoryRecordStore;

    #[tokio::test]
    async fn enrich_inserts_the_record() -> Result<()> {
        let store = Arc::new(MemoryRecordStore::new());
        let enricher = CatalogEnricher::new(store.clone());
        let entry = PathedEntry::under("Films", RemoteEntry::leaf("m1", "movie.mkv", 700, 42));

        enricher.enrich(entry).await?;

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "m1");
        assert_eq!(records[0].size, 700);
        assert_eq!(records[0].modified_time, 42);
        Ok(())
    }
}
