//! Core remote-tree domain types shared across the workspace.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// MIME type the remote store assigns to folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Separator used when joining ancestor folder names into a path.
pub const PATH_SEPARATOR: char = '/';

/// Opaque, store-assigned identifier shared by remote entries and persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntryId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Native distinction the remote tree makes between containers and files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A container that may hold further entries.
    Folder,
    /// A file.
    Leaf,
}

impl EntryKind {
    /// Classify an entry from the MIME type reported by the store.
    #[must_use]
    pub fn from_mime_type(mime_type: Option<&str>) -> Self {
        if mime_type == Some(FOLDER_MIME_TYPE) {
            Self::Folder
        } else {
            Self::Leaf
        }
    }

    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Leaf => "leaf",
        }
    }
}

/// One item as reported by a remote listing. Produced fresh on every crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Store-assigned identifier.
    pub id: EntryId,
    /// Display name within the parent folder.
    pub name: String,
    /// Folder or leaf.
    pub kind: EntryKind,
    /// Size in bytes (leaves only).
    pub size: Option<u64>,
    /// Last modification time in epoch milliseconds (leaves only).
    pub modified_time: Option<i64>,
    /// MIME type tag (leaves only).
    pub mime_type: Option<String>,
}

impl RemoteEntry {
    /// Construct a folder entry.
    #[must_use]
    pub fn folder(id: impl Into<EntryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::Folder,
            size: None,
            modified_time: None,
            mime_type: Some(FOLDER_MIME_TYPE.to_string()),
        }
    }

    /// Construct a leaf entry with a size and modification time.
    #[must_use]
    pub fn leaf(
        id: impl Into<EntryId>,
        name: impl Into<String>,
        size: u64,
        modified_time: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: EntryKind::Leaf,
            size: Some(size),
            modified_time: Some(modified_time),
            mime_type: None,
        }
    }

    /// Attach a MIME type to the entry.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether this entry is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Modification time, falling back to the persisted column default of `0`.
    #[must_use]
    pub fn modified_millis(&self) -> i64 {
        self.modified_time.unwrap_or_default()
    }
}

/// A remote entry annotated with its path relative to the crawl root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathedEntry {
    /// Ancestor folder names and the entry name joined by [`PATH_SEPARATOR`].
    pub path: String,
    /// The entry itself.
    pub entry: RemoteEntry,
}

impl PathedEntry {
    /// Annotate `entry` as a child of `parent_path`; an empty parent means the crawl root.
    #[must_use]
    pub fn under(parent_path: &str, entry: RemoteEntry) -> Self {
        let path = join_path(parent_path, &entry.name);
        Self { path, entry }
    }

    /// Identifier of the underlying entry.
    #[must_use]
    pub const fn id(&self) -> &EntryId {
        &self.entry.id
    }

    /// Persisted form of this entry, as written when an insert is accepted.
    #[must_use]
    pub fn to_record(&self) -> PersistedRecord {
        PersistedRecord {
            id: self.entry.id.clone(),
            name: self.entry.name.clone(),
            size: self.entry.size.unwrap_or_default(),
            modified_time: self.entry.modified_millis(),
        }
    }
}

/// Join a parent path and a child name with the store's separator.
#[must_use]
pub fn join_path(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}{PATH_SEPARATOR}{name}")
    }
}

/// Locally persisted view of a previously seen leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Identifier shared with [`RemoteEntry::id`].
    pub id: EntryId,
    /// Name at the time the record was written.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in epoch milliseconds.
    pub modified_time: i64,
}

/// New modification time for an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    /// Record to update.
    pub id: EntryId,
    /// Replacement modification time in epoch milliseconds.
    pub modified_time: i64,
}

impl From<&PathedEntry> for RecordUpdate {
    fn from(entry: &PathedEntry) -> Self {
        Self {
            id: entry.entry.id.clone(),
            modified_time: entry.entry.modified_millis(),
        }
    }
}

/// One page of a paginated remote listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries on this page, in listing order.
    pub entries: Vec<RemoteEntry>,
    /// Continuation token; `None` or empty when the listing is exhausted.
    pub next_page_token: Option<String>,
}

impl ListPage {
    /// Continuation token when another page exists.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.next_page_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

/// Classified difference between the remote tree and persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Remote leaves with no persisted record.
    pub inserted: Vec<PathedEntry>,
    /// Remote leaves whose modification time differs from the persisted value.
    pub updated: Vec<PathedEntry>,
    /// Persisted identifiers that no longer appear remotely.
    pub deleted: Vec<EntryId>,
    /// Number of remote leaves that matched their persisted record.
    pub unchanged: usize,
}

/// Aggregate counts reported before and after applying a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Entries to insert.
    pub inserted: usize,
    /// Entries to update.
    pub updated: usize,
    /// Entries to delete.
    pub deleted: usize,
    /// Entries left untouched.
    pub unchanged: usize,
}

impl ChangeSet {
    /// Whether applying this change set would do nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Counts per category.
    #[must_use]
    pub const fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            inserted: self.inserted.len(),
            updated: self.updated.len(),
            deleted: self.deleted.len(),
            unchanged: self.unchanged,
        }
    }

    /// Persisted state that results from applying this change set with every insert accepted.
    #[must_use]
    pub fn apply_to(&self, persisted: &[PersistedRecord]) -> Vec<PersistedRecord> {
        let deleted: HashSet<&EntryId> = self.deleted.iter().collect();
        let updated: HashMap<&EntryId, i64> = self
            .updated
            .iter()
            .map(|entry| (entry.id(), entry.entry.modified_millis()))
            .collect();

        let mut next: Vec<PersistedRecord> = persisted
            .iter()
            .filter(|record| !deleted.contains(&record.id))
            .map(|record| {
                let mut record = record.clone();
                if let Some(modified_time) = updated.get(&record.id) {
                    record.modified_time = *modified_time;
                }
                record
            })
            .collect();
        next.extend(self.inserted.iter().map(PathedEntry::to_record));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_entries_have_no_prefix() {
        let entry = PathedEntry::under("", RemoteEntry::leaf("a", "movie.mkv", 1, 1));
        assert_eq!(entry.path, "movie.mkv");

        let nested = PathedEntry::under("F1/F2", RemoteEntry::leaf("b", "leaf2", 1, 1));
        assert_eq!(nested.path, "F1/F2/leaf2");
    }

    #[test]
    fn kind_follows_folder_mime_type() {
        assert_eq!(
            EntryKind::from_mime_type(Some(FOLDER_MIME_TYPE)),
            EntryKind::Folder
        );
        assert_eq!(EntryKind::from_mime_type(Some("video/mp4")), EntryKind::Leaf);
        assert_eq!(EntryKind::from_mime_type(None), EntryKind::Leaf);
        assert!(RemoteEntry::folder("f", "F1").is_folder());
        assert_eq!(EntryKind::Folder.as_str(), "folder");
        assert_eq!(RemoteEntry::leaf("l", "x", 1, 1).kind.as_str(), "leaf");
    }

    #[test]
    fn missing_timestamp_maps_to_column_default() {
        let mut entry = RemoteEntry::leaf("a", "a", 1, 7);
        assert_eq!(entry.modified_millis(), 7);
        entry.modified_time = None;
        assert_eq!(entry.modified_millis(), 0);
    }

    #[test]
    fn empty_continuation_token_ends_listing() {
        let page = ListPage {
            entries: Vec::new(),
            next_page_token: Some(String::new()),
        };
        assert!(page.continuation().is_none());

        let page = ListPage {
            entries: Vec::new(),
            next_page_token: Some("next".to_string()),
        };
        assert_eq!(page.continuation(), Some("next"));
    }

    #[test]
    fn apply_to_drops_updates_and_inserts() {
        let persisted = vec![
            PersistedRecord {
                id: EntryId::from("a"),
                name: "a".to_string(),
                size: 1,
                modified_time: 1,
            },
            PersistedRecord {
                id: EntryId::from("c"),
                name: "c".to_string(),
                size: 1,
                modified_time: 9,
            },
        ];
        let changes = ChangeSet {
            inserted: vec![PathedEntry::under("", RemoteEntry::leaf("b", "b", 2, 5))],
            updated: vec![PathedEntry::under("", RemoteEntry::leaf("a", "a", 1, 3))],
            deleted: vec![EntryId::from("c")],
            unchanged: 0,
        };

        let next = changes.apply_to(&persisted);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].id.as_str(), "a");
        assert_eq!(next[0].modified_time, 3);
        assert_eq!(next[1].id.as_str(), "b");
        assert_eq!(next[1].size, 2);
    }

    #[test]
    fn entry_id_serialises_transparently() {
        let encoded = serde_json::to_string(&EntryId::from("abc")).expect("encode");
        assert_eq!(encoded, "\"abc\"");
    }
}
