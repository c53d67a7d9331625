//! In-memory remote tree implementing [`RemoteListing`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use treesync_core::{EntryId, ListPage, RemoteEntry, RemoteListing};

/// Root identifier used by the canned trees below.
pub const ROOT_ID: &str = "root";

/// Remote tree held in memory, with pagination and failure injection.
///
/// Children are returned in insertion order. Folders that were never given
/// children list as empty.
#[derive(Debug, Default)]
pub struct FakeTree {
    children: HashMap<EntryId, Vec<RemoteEntry>>,
    failing: HashSet<EntryId>,
    page_size: Option<usize>,
    delay: Option<Duration>,
    listed: Mutex<Vec<EntryId>>,
    pages_served: AtomicUsize,
}

impl FakeTree {
    /// Start an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder named `name` under `parent`.
    #[must_use]
    pub fn folder(mut self, parent: &str, id: &str, name: &str) -> Self {
        self.push(parent, RemoteEntry::folder(id, name));
        self
    }

    /// Add a leaf under `parent`.
    #[must_use]
    pub fn leaf(mut self, parent: &str, id: &str, name: &str, modified_time: i64) -> Self {
        self.push(parent, RemoteEntry::leaf(id, name, 1024, modified_time));
        self
    }

    /// Add a leaf with an explicit MIME type under `parent`.
    #[must_use]
    pub fn leaf_with_mime(
        mut self,
        parent: &str,
        id: &str,
        name: &str,
        modified_time: i64,
        mime_type: &str,
    ) -> Self {
        self.push(
            parent,
            RemoteEntry::leaf(id, name, 1024, modified_time).with_mime_type(mime_type),
        );
        self
    }

    /// Make every listing of `folder_id` fail.
    #[must_use]
    pub fn failing_on(mut self, folder_id: &str) -> Self {
        self.failing.insert(EntryId::from(folder_id));
        self
    }

    /// Split listings into pages of at most `page_size` entries.
    #[must_use]
    pub fn paged(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Sleep for `delay` before serving each page.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Folder ids listed so far, in request order, one per page served.
    #[must_use]
    pub fn listed_folders(&self) -> Vec<EntryId> {
        self.listed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of pages served so far.
    #[must_use]
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    fn push(&mut self, parent: &str, entry: RemoteEntry) {
        self.children
            .entry(EntryId::from(parent))
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl RemoteListing for FakeTree {
    async fn list_page(
        &self,
        parent_id: &EntryId,
        folders_only: bool,
        page_token: Option<&str>,
    ) -> Result<ListPage> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.listed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(parent_id.clone());
        if self.failing.contains(parent_id) {
            bail!("listing refused for folder {parent_id}");
        }

        let children: Vec<RemoteEntry> = self
            .children
            .get(parent_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| !folders_only || entry.is_folder())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let offset = match page_token {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let page_size = self.page_size.unwrap_or(usize::MAX);
        let end = offset.saturating_add(page_size).min(children.len());
        let entries = children.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < children.len()).then(|| end.to_string());

        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(ListPage {
            entries,
            next_page_token,
        })
    }
}

/// Tree used by most crawl scenarios:
///
/// ```text
/// root
/// ├── F1 (f1)
/// │   ├── F2 (f2)
/// │   │   └── leaf2 (l2)
/// │   └── leaf1 (l1)
/// └── top (l0)
/// ```
#[must_use]
pub fn nested_tree() -> FakeTree {
    FakeTree::new()
        .folder(ROOT_ID, "f1", "F1")
        .leaf(ROOT_ID, "l0", "top", 10)
        .folder("f1", "f2", "F2")
        .leaf("f1", "l1", "leaf1", 11)
        .leaf("f2", "l2", "leaf2", 12)
}

/// Balanced tree of `fanout` folders per level, `depth` levels deep, with `leaves`
/// leaves in every folder. Leaf ids are unique.
#[must_use]
pub fn wide_tree(depth: usize, fanout: usize, leaves: usize) -> FakeTree {
    let mut tree = FakeTree::new();
    let mut frontier = vec![ROOT_ID.to_string()];
    for level in 0..=depth {
        let mut next = Vec::new();
        for folder in &frontier {
            for index in 0..leaves {
                let id = format!("{folder}-l{index}");
                tree = tree.leaf(folder, &id, &format!("leaf{index}"), 1);
            }
            if level < depth {
                for index in 0..fanout {
                    let id = format!("{folder}-f{index}");
                    tree = tree.folder(folder, &id, &format!("dir{index}"));
                    next.push(id);
                }
            }
        }
        frontier = next;
    }
    tree
}
