//! In-memory collaborators for the sync pipeline.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, bail};
use async_trait::async_trait;
use treesync_core::{EntryId, Enricher, PathedEntry, PersistedRecord, RecordStore, RecordUpdate};

/// Record store held in memory that records every batch call.
///
/// Failure injection is by 1-based call number per operation, so a test can make
/// the second update batch fail while the first and third succeed.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<EntryId, PersistedRecord>>,
    update_calls: Mutex<Vec<Vec<RecordUpdate>>>,
    delete_calls: Mutex<Vec<Vec<EntryId>>>,
    failing_updates: HashSet<usize>,
    failing_deletes: HashSet<usize>,
    fail_listing: bool,
}

impl MemoryRecordStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = PersistedRecord>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.records.lock().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                guard.insert(record.id.clone(), record);
            }
        }
        store
    }

    /// Fail the `call`-th update batch (1-based).
    #[must_use]
    pub fn failing_update_call(mut self, call: usize) -> Self {
        self.failing_updates.insert(call);
        self
    }

    /// Fail the `call`-th delete batch (1-based).
    #[must_use]
    pub fn failing_delete_call(mut self, call: usize) -> Self {
        self.failing_deletes.insert(call);
        self
    }

    /// Fail every `list_known_leaves` call.
    #[must_use]
    pub const fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Snapshot of stored records ordered by id.
    #[must_use]
    pub fn records(&self) -> Vec<PersistedRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Sizes of every update batch received, in call order.
    #[must_use]
    pub fn update_batch_sizes(&self) -> Vec<usize> {
        self.update_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Vec::len)
            .collect()
    }

    /// Sizes of every delete batch received, in call order.
    #[must_use]
    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.delete_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Vec::len)
            .collect()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_known_leaves(&self) -> Result<Vec<PersistedRecord>> {
        if self.fail_listing {
            bail!("record listing unavailable");
        }
        Ok(self.records())
    }

    async fn update_modified_times(&self, updates: &[RecordUpdate]) -> Result<()> {
        let call = {
            let mut calls = self.update_calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(updates.to_vec());
            calls.len()
        };
        if self.failing_updates.contains(&call) {
            bail!("update batch {call} rejected");
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for update in updates {
            if let Some(record) = records.get_mut(&update.id) {
                record.modified_time = update.modified_time;
            }
        }
        drop(records);
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[EntryId]) -> Result<()> {
        let call = {
            let mut calls = self.delete_calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(ids.to_vec());
            calls.len()
        };
        if self.failing_deletes.contains(&call) {
            bail!("delete batch {call} rejected");
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            records.remove(id);
        }
        drop(records);
        Ok(())
    }

    async fn insert_record(&self, record: &PersistedRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record.clone());
        Ok(())
    }
}

/// Enricher that records every entry it receives.
#[derive(Debug, Default)]
pub struct RecordingEnricher {
    received: Mutex<Vec<PathedEntry>>,
    failing: HashSet<EntryId>,
}

impl RecordingEnricher {
    /// Enricher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail enrichment of `id` after recording it.
    #[must_use]
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(EntryId::from(id));
        self
    }

    /// Ids received so far, sorted.
    #[must_use]
    pub fn received_ids(&self) -> Vec<EntryId> {
        let mut ids: Vec<EntryId> = self
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| entry.id().clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Enricher for RecordingEnricher {
    async fn enrich(&self, entry: PathedEntry) -> Result<()> {
        let id = entry.id().clone();
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        if self.failing.contains(&id) {
            bail!("metadata lookup failed for {id}");
        }
        Ok(())
    }
}
