//! Builder for the remote store's textual filter grammar.

use treesync_core::{EntryId, FOLDER_MIME_TYPE};

/// Conjunction of filter conditions, rendered as `cond and cond and ...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveQuery {
    conditions: Vec<String>,
}

impl DriveQuery {
    /// Start an empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Filter for the non-trashed children of `parent_id`, optionally folders only.
    #[must_use]
    pub fn children_of(parent_id: &EntryId, folders_only: bool) -> Self {
        let query = Self::new().in_parents(parent_id).trashed(false);
        if folders_only {
            query.mime_type_equals(FOLDER_MIME_TYPE)
        } else {
            query
        }
    }

    /// Entries named exactly `name`.
    #[must_use]
    pub fn name_equals(mut self, name: &str) -> Self {
        self.conditions.push(format!("name = {}", quote(name)));
        self
    }

    /// Entries with the given MIME type.
    #[must_use]
    pub fn mime_type_equals(mut self, mime_type: &str) -> Self {
        self.conditions
            .push(format!("mimeType = {}", quote(mime_type)));
        self
    }

    /// Entries without the given MIME type.
    #[must_use]
    pub fn mime_type_not_equals(mut self, mime_type: &str) -> Self {
        self.conditions
            .push(format!("mimeType != {}", quote(mime_type)));
        self
    }

    /// Entries whose parents include `parent_id`.
    #[must_use]
    pub fn in_parents(mut self, parent_id: &EntryId) -> Self {
        self.conditions
            .push(format!("{} in parents", quote(parent_id.as_str())));
        self
    }

    /// Entries whose trashed flag equals `trashed`.
    #[must_use]
    pub fn trashed(mut self, trashed: bool) -> Self {
        self.conditions.push(format!("trashed = {trashed}"));
        self
    }

    /// Render the conjunction.
    #[must_use]
    pub fn build(&self) -> String {
        self.conditions.join(" and ")
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
