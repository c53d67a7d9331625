//! Collaborator traits implemented by remote, persistence, and enrichment adapters.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{EntryId, ListPage, PathedEntry, PersistedRecord, RecordUpdate, RemoteEntry};

/// Read-only access to a folder's immediate children in the remote store.
///
/// Implementations exclude trashed entries server-side and order results
/// folder-then-name.
#[async_trait]
pub trait RemoteListing: Send + Sync {
    /// Fetch one page of children of `parent_id`, resuming from `page_token`.
    async fn list_page(
        &self,
        parent_id: &EntryId,
        folders_only: bool,
        page_token: Option<&str>,
    ) -> Result<ListPage>;

    /// Fetch every child of `parent_id`, following continuation tokens until exhausted.
    async fn list_children(
        &self,
        parent_id: &EntryId,
        folders_only: bool,
    ) -> Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_page(parent_id, folders_only, page_token.as_deref())
                .await?;
            let next = page.continuation().map(str::to_owned);
            entries.extend(page.entries);
            match next {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(entries)
    }
}

/// Persisted record catalog consumed by reconciliation and the change applier.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every known leaf record.
    async fn list_known_leaves(&self) -> Result<Vec<PersistedRecord>>;

    /// Replace modification times for the given records as one unit.
    async fn update_modified_times(&self, updates: &[RecordUpdate]) -> Result<()>;

    /// Delete records by identifier as one unit, cascading to dependent aggregates.
    async fn delete_by_ids(&self, ids: &[EntryId]) -> Result<()>;

    /// Accept a newly discovered leaf into the catalog.
    async fn insert_record(&self, record: &PersistedRecord) -> Result<()>;
}

/// Downstream processing for newly discovered leaves.
///
/// Implementations own success and failure of their work; errors are logged by the
/// caller and never flow back into the sync pipeline.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fetch and persist the full record for `entry`.
    async fn enrich(&self, entry: PathedEntry) -> Result<()>;
}
