use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use treesync_app::{AppError, CatalogEnricher, SyncDependencies, SyncService};
use treesync_core::{EntryId, PersistedRecord, RecordStore, RemoteListing};
use treesync_pool::{ShutdownOutcome, TaskPool};
use treesync_remote::CrawlError;
use treesync_telemetry::Metrics;
use treesync_test_support::fixtures::{FakeTree, ROOT_ID, nested_tree};
use treesync_test_support::mocks::MemoryRecordStore;

fn record(id: &str, modified_time: i64) -> PersistedRecord {
    PersistedRecord {
        id: EntryId::from(id),
        name: id.to_string(),
        size: 1024,
        modified_time,
    }
}

/// Run one pass with a fresh pool and wait for its enrichment tasks.
async fn run_pass(
    tree: &Arc<FakeTree>,
    store: &Arc<MemoryRecordStore>,
    mime_prefix: Option<&str>,
) -> Result<treesync_app::SyncReport> {
    let pool = TaskPool::new(4)?;
    let listing: Arc<dyn RemoteListing> = tree.clone();
    let records: Arc<dyn RecordStore> = store.clone();
    let service = SyncService::new(
        EntryId::from(ROOT_ID),
        mime_prefix.map(str::to_string),
        100,
        SyncDependencies {
            listing,
            store: Arc::clone(&records),
            enricher: Arc::new(CatalogEnricher::new(records)),
            pool: pool.clone(),
            metrics: Metrics::new()?,
        },
    )?;
    let report = service.run_once().await?;
    assert_eq!(
        pool.shutdown(Duration::from_secs(5)).await,
        ShutdownOutcome::Drained
    );
    Ok(report)
}

#[tokio::test]
async fn first_pass_inserts_then_second_pass_is_a_no_op() -> Result<()> {
    let tree = Arc::new(nested_tree());
    let store = Arc::new(MemoryRecordStore::new());

    let first = run_pass(&tree, &store, None).await?;
    assert_eq!(first.crawled, 3);
    assert_eq!(first.changes.inserted, 3);
    assert_eq!(first.applied.inserts_submitted, 3);
    assert_eq!(store.records().len(), 3);

    let second = run_pass(&tree, &store, None).await?;
    assert_eq!(second.changes.inserted, 0);
    assert_eq!(second.changes.updated, 0);
    assert_eq!(second.changes.deleted, 0);
    assert_eq!(second.changes.unchanged, 3);
    assert!(store.update_batch_sizes().is_empty());
    assert!(store.delete_batch_sizes().is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_and_persisted_differences_are_classified() -> Result<()> {
    // Remote holds A@1 and B@5; the catalog holds A@1 and C@9.
    let tree = Arc::new(
        FakeTree::new()
            .leaf(ROOT_ID, "A", "a.mkv", 1)
            .leaf(ROOT_ID, "B", "b.mkv", 5),
    );
    let store = Arc::new(MemoryRecordStore::with_records([
        record("A", 1),
        record("C", 9),
    ]));

    let report = run_pass(&tree, &store, None).await?;
    assert_eq!(report.changes.inserted, 1);
    assert_eq!(report.changes.deleted, 1);
    assert_eq!(report.changes.updated, 0);
    assert_eq!(report.changes.unchanged, 1);

    let ids: Vec<String> = store
        .records()
        .iter()
        .map(|record| record.id.to_string())
        .collect();
    assert_eq!(ids, vec!["A", "B"]);
    Ok(())
}

#[tokio::test]
async fn changed_timestamps_become_updates() -> Result<()> {
    let tree = Arc::new(FakeTree::new().leaf(ROOT_ID, "A", "a.mkv", 2));
    let store = Arc::new(MemoryRecordStore::with_records([record("A", 1)]));

    let report = run_pass(&tree, &store, None).await?;
    assert_eq!(report.changes.updated, 1);
    assert_eq!(store.update_batch_sizes(), vec![1]);
    assert_eq!(store.records()[0].modified_time, 2);
    Ok(())
}

#[tokio::test]
async fn mime_prefix_limits_what_is_reconciled() -> Result<()> {
    let tree = Arc::new(
        FakeTree::new()
            .leaf_with_mime(ROOT_ID, "v1", "movie.mkv", 1, "video/x-matroska")
            .leaf_with_mime(ROOT_ID, "s1", "movie.srt", 1, "application/x-subrip")
            .leaf(ROOT_ID, "n1", "unknown", 1),
    );
    let store = Arc::new(MemoryRecordStore::new());

    let report = run_pass(&tree, &store, Some("video/")).await?;
    assert_eq!(report.crawled, 3);
    assert_eq!(report.filtered_out, 2);
    assert_eq!(report.changes.inserted, 1);
    assert_eq!(store.records()[0].id.as_str(), "v1");
    Ok(())
}

#[tokio::test]
async fn crawl_failure_is_fatal_and_writes_nothing() -> Result<()> {
    let tree = Arc::new(nested_tree().failing_on("f2"));
    let store = Arc::new(MemoryRecordStore::with_records([record("stale", 1)]));

    match run_pass(&tree, &store, None).await {
        Err(err) => match err.downcast_ref::<AppError>() {
            Some(AppError::Crawl {
                source: CrawlError::Listing { folder_id, .. },
            }) => assert_eq!(folder_id.as_str(), "f2"),
            _ => bail!("unexpected error: {err:#}"),
        },
        Ok(report) => bail!("pass succeeded despite failing listing: {report:?}"),
    }
    assert!(store.delete_batch_sizes().is_empty());
    assert_eq!(store.records(), vec![record("stale", 1)]);
    Ok(())
}

#[tokio::test]
async fn unreadable_catalog_is_fatal() -> Result<()> {
    let tree = Arc::new(nested_tree());
    let store = Arc::new(MemoryRecordStore::new().failing_listing());

    match run_pass(&tree, &store, None).await {
        Err(err) => assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Store {
                operation: "record_store.list_known_leaves",
                ..
            })
        )),
        Ok(_) => bail!("pass succeeded without a catalog"),
    }
    Ok(())
}
