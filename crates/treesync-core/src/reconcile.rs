//! Three-way diff between the current remote leaf set and persisted records.
//!
//! # Design
//! - Pure and synchronous; callers own all I/O.
//! - "Unchanged" compares modification times only, matching the store's change granularity.

use std::collections::{HashMap, HashSet};

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{ChangeSet, EntryId, PathedEntry, PersistedRecord};

/// Classify remote leaves against persisted records.
///
/// Folder entries in `remote` are ignored. Unchanged leaves are dropped from the
/// result and only counted.
///
/// # Errors
///
/// Returns [`ReconcileError::DuplicateRemoteId`] when an identifier appears twice in
/// `remote`, and [`ReconcileError::DuplicatePersistedId`] when one appears twice in
/// `persisted`.
pub fn reconcile(
    remote: Vec<PathedEntry>,
    persisted: &[PersistedRecord],
) -> ReconcileResult<ChangeSet> {
    let mut known: HashMap<&EntryId, i64> = HashMap::with_capacity(persisted.len());
    for record in persisted {
        if known.insert(&record.id, record.modified_time).is_some() {
            return Err(ReconcileError::DuplicatePersistedId {
                id: record.id.clone(),
            });
        }
    }

    let mut seen: HashSet<EntryId> = HashSet::with_capacity(remote.len());
    let mut changes = ChangeSet::default();
    for entry in remote {
        if entry.entry.is_folder() {
            continue;
        }
        if !seen.insert(entry.id().clone()) {
            return Err(ReconcileError::DuplicateRemoteId {
                id: entry.entry.id,
            });
        }
        match known.get(entry.id()) {
            None => changes.inserted.push(entry),
            Some(modified_time) if *modified_time != entry.entry.modified_millis() => {
                changes.updated.push(entry);
            }
            Some(_) => changes.unchanged += 1,
        }
    }

    changes.deleted = persisted
        .iter()
        .filter(|record| !seen.contains(&record.id))
        .map(|record| record.id.clone())
        .collect();

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RemoteEntry;

    fn remote(id: &str, modified_time: i64) -> PathedEntry {
        PathedEntry::under("", RemoteEntry::leaf(id, id, 10, modified_time))
    }

    fn record(id: &str, modified_time: i64) -> PersistedRecord {
        PersistedRecord {
            id: EntryId::from(id),
            name: id.to_string(),
            size: 10,
            modified_time,
        }
    }

    fn ids(entries: &[PathedEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.id().as_str()).collect()
    }

    #[test]
    fn new_and_vanished_entries_are_classified() {
        let changes = reconcile(
            vec![remote("A", 1), remote("B", 5)],
            &[record("A", 1), record("C", 9)],
        )
        .expect("reconcile");

        assert_eq!(ids(&changes.inserted), vec!["B"]);
        assert!(changes.updated.is_empty());
        assert_eq!(changes.deleted, vec![EntryId::from("C")]);
        assert_eq!(changes.unchanged, 1);
    }

    #[test]
    fn timestamp_drift_is_an_update() {
        let changes = reconcile(vec![remote("A", 1)], &[record("A", 2)]).expect("reconcile");

        assert!(changes.inserted.is_empty());
        assert_eq!(ids(&changes.updated), vec!["A"]);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn name_and_size_drift_without_timestamp_change_is_unchanged() {
        let mut entry = remote("A", 4);
        entry.entry.name = "renamed".to_string();
        entry.entry.size = Some(999);

        let changes = reconcile(vec![entry], &[record("A", 4)]).expect("reconcile");
        assert!(changes.is_empty());
        assert_eq!(changes.unchanged, 1);
    }

    #[test]
    fn duplicate_remote_ids_are_rejected() {
        let err = reconcile(vec![remote("A", 1), remote("A", 2)], &[]).expect_err("duplicate");
        assert_eq!(
            err,
            ReconcileError::DuplicateRemoteId {
                id: EntryId::from("A")
            }
        );
    }

    #[test]
    fn duplicate_persisted_ids_are_rejected() {
        let err = reconcile(Vec::new(), &[record("A", 1), record("A", 1)]).expect_err("duplicate");
        assert!(matches!(err, ReconcileError::DuplicatePersistedId { .. }));
    }

    #[test]
    fn folders_are_not_reconciled() {
        let folder = PathedEntry::under("", RemoteEntry::folder("F", "F1"));
        let changes = reconcile(vec![folder], &[]).expect("reconcile");
        assert!(changes.is_empty());
    }

    #[test]
    fn partitions_are_disjoint_and_cover_all_changed_ids() {
        let remote_set = vec![remote("A", 1), remote("B", 2), remote("D", 4), remote("E", 5)];
        let persisted = vec![record("A", 1), record("B", 3), record("C", 3), record("F", 6)];
        let changes = reconcile(remote_set.clone(), &persisted).expect("reconcile");

        let mut classified: Vec<&str> = ids(&changes.inserted);
        classified.extend(ids(&changes.updated));
        classified.extend(changes.deleted.iter().map(EntryId::as_str));
        let unique: HashSet<&str> = classified.iter().copied().collect();
        assert_eq!(unique.len(), classified.len(), "partitions overlap");

        let all: HashSet<&str> = remote_set
            .iter()
            .map(|entry| entry.id().as_str())
            .chain(persisted.iter().map(|record| record.id.as_str()))
            .collect();
        assert_eq!(unique.len() + changes.unchanged, all.len());
        assert!(!unique.contains("A"));
    }

    #[test]
    fn reconciling_after_apply_is_a_no_op() {
        let remote_set = vec![remote("A", 1), remote("B", 5), remote("D", 8)];
        let persisted = vec![record("A", 2), record("C", 9)];

        let first = reconcile(remote_set.clone(), &persisted).expect("first pass");
        assert!(!first.is_empty());

        let next_state = first.apply_to(&persisted);
        let second = reconcile(remote_set, &next_state).expect("second pass");
        assert!(second.inserted.is_empty());
        assert!(second.updated.is_empty());
        assert!(second.deleted.is_empty());
        assert_eq!(second.unchanged, 3);
    }
}
