//! Concurrent descent of the remote folder tree.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};
use treesync_core::{EntryId, PathedEntry, RemoteListing, join_path};
use treesync_pool::{Expansion, PoolError, TaskPool};

use crate::error::{CrawlError, CrawlResult};

/// Folder still to be listed, with its path relative to the crawl root.
#[derive(Debug)]
struct FolderNode {
    id: EntryId,
    path: String,
}

/// Walks a remote tree from a root folder and returns every leaf with its path.
///
/// Each folder listing runs as its own pool task; sibling subtrees proceed
/// independently and share nothing but the listing client.
pub struct Crawler<L: ?Sized> {
    listing: Arc<L>,
    pool: TaskPool,
}

impl<L: ?Sized> std::fmt::Debug for Crawler<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("parallelism", &self.pool.parallelism())
            .finish_non_exhaustive()
    }
}

impl<L> Crawler<L>
where
    L: RemoteListing + ?Sized + 'static,
{
    /// Build a crawler that lists through `listing` on `pool`.
    #[must_use]
    pub const fn new(listing: Arc<L>, pool: TaskPool) -> Self {
        Self { listing, pool }
    }

    /// List every leaf reachable from `root_id`.
    ///
    /// Leaves of one folder keep their listing order; order across sibling
    /// subtrees is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Listing`] naming the failing folder when any listing
    /// fails; no partial tree is returned. Returns [`CrawlError::Pool`] when the
    /// pool cannot run the crawl.
    pub async fn crawl(&self, root_id: &EntryId) -> CrawlResult<Vec<PathedEntry>> {
        let started = Instant::now();
        let listing = Arc::clone(&self.listing);
        let root = FolderNode {
            id: root_id.clone(),
            path: String::new(),
        };

        let outcome = self
            .pool
            .invoke_recursive(root, move |node| {
                let listing = Arc::clone(&listing);
                async move { expand_folder(listing.as_ref(), node).await }
            })
            .await;

        match outcome {
            Ok(leaves) => {
                info!(
                    root_id = %root_id,
                    leaves = leaves.len(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "crawl completed"
                );
                Ok(leaves)
            }
            Err(err) => {
                let err = into_crawl_error(err);
                if let CrawlError::Listing {
                    folder_id,
                    path,
                    source,
                } = &err
                {
                    error!(
                        root_id = %root_id,
                        folder_id = %folder_id,
                        path = %path,
                        error = %format!("{source:#}"),
                        "crawl aborted"
                    );
                }
                Err(err)
            }
        }
    }
}

async fn expand_folder<L>(
    listing: &L,
    node: FolderNode,
) -> anyhow::Result<Expansion<FolderNode, PathedEntry>>
where
    L: RemoteListing + ?Sized,
{
    let children = listing
        .list_children(&node.id, false)
        .await
        .map_err(|source| CrawlError::Listing {
            folder_id: node.id.clone(),
            path: node.path.clone(),
            source,
        })?;

    let mut leaves = Vec::new();
    let mut folders = Vec::new();
    for child in children {
        if child.is_folder() {
            folders.push(FolderNode {
                path: join_path(&node.path, &child.name),
                id: child.id,
            });
        } else {
            leaves.push(PathedEntry::under(&node.path, child));
        }
    }

    debug!(
        folder_id = %node.id,
        path = %node.path,
        leaves = leaves.len(),
        subfolders = folders.len(),
        "folder listed"
    );
    Ok(Expansion::new(leaves, folders))
}

fn into_crawl_error(err: PoolError) -> CrawlError {
    match err {
        PoolError::BranchFailed { source } => match source.downcast::<CrawlError>() {
            Ok(crawl) => crawl,
            Err(source) => CrawlError::Pool {
                source: PoolError::BranchFailed { source },
            },
        },
        other => CrawlError::Pool { source: other },
    }
}
