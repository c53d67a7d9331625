//! File catalog backed by the `treesync.files` table.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use treesync_core::{EntryId, PersistedRecord, RecordStore, RecordUpdate};

use crate::error::{DataError, Result};

const SELECT_FILES: &str = r"
    SELECT id, name, size, modified_time
    FROM treesync.files
    ORDER BY id
";

const UPDATE_MODIFIED_TIMES: &str = r"
    UPDATE treesync.files AS f
    SET modified_time = u.modified_time
    FROM UNNEST($1::text[], $2::bigint[]) AS u(id, modified_time)
    WHERE f.id = u.id
";

const DELETE_FILES: &str = r"
    DELETE FROM treesync.files
    WHERE id = ANY($1::text[])
";

const UPSERT_FILE: &str = r"
    INSERT INTO treesync.files (id, name, size, modified_time)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id) DO UPDATE
    SET name = EXCLUDED.name,
        size = EXCLUDED.size,
        modified_time = EXCLUDED.modified_time
";

const UPSERT_AGGREGATE: &str = r"
    INSERT INTO treesync.file_aggregates (file_id, kind, payload)
    VALUES ($1, $2, $3)
    ON CONFLICT (file_id, kind) DO UPDATE
    SET payload = EXCLUDED.payload,
        updated_at = now()
";

const COUNT_AGGREGATES: &str = r"
    SELECT COUNT(*) FROM treesync.file_aggregates WHERE file_id = $1
";

fn map_query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::Query { operation, source }
}

/// Open a connection pool for `database_url`, giving up after `acquire_timeout`.
///
/// # Errors
///
/// Returns an error when the database is unreachable.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .map_err(map_query_err("connect"))
}

#[derive(Debug, FromRow)]
struct FileRow {
    id: String,
    name: String,
    size: i64,
    modified_time: i64,
}

impl TryFrom<FileRow> for PersistedRecord {
    type Error = DataError;

    fn try_from(row: FileRow) -> Result<Self> {
        let size = u64::try_from(row.size).map_err(|_| DataError::NegativeColumn {
            column: "size",
            value: row.size,
        })?;
        Ok(Self {
            id: EntryId::new(row.id),
            name: row.name,
            size,
            modified_time: row.modified_time,
        })
    }
}

/// Database-backed catalog of known leaves.
#[derive(Clone, Debug)]
pub struct FileStore {
    pool: PgPool,
}

impl FileStore {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::Migrate { source })?;
        Ok(Self { pool })
    }

    /// Load every known leaf, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored size is negative.
    pub async fn load_records(&self) -> Result<Vec<PersistedRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(SELECT_FILES)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_err("files.select"))?;
        rows.into_iter().map(PersistedRecord::try_from).collect()
    }

    /// Set new modification times for `updates` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; no row is changed in that case.
    pub async fn apply_updates(&self, updates: &[RecordUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = updates.iter().map(|update| update.id.as_str()).collect();
        let times: Vec<i64> = updates.iter().map(|update| update.modified_time).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_query_err("files.update.begin"))?;
        let affected = sqlx::query(UPDATE_MODIFIED_TIMES)
            .bind(&ids)
            .bind(&times)
            .execute(&mut *tx)
            .await
            .map_err(map_query_err("files.update"))?
            .rows_affected();
        tx.commit()
            .await
            .map_err(map_query_err("files.update.commit"))?;

        debug!(requested = updates.len(), affected, "modified times updated");
        Ok(affected)
    }

    /// Delete `ids` and their aggregates in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is deleted in that case.
    pub async fn remove(&self, ids: &[EntryId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = ids.iter().map(EntryId::as_str).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_query_err("files.delete.begin"))?;
        let affected = sqlx::query(DELETE_FILES)
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(map_query_err("files.delete"))?
            .rows_affected();
        tx.commit()
            .await
            .map_err(map_query_err("files.delete.commit"))?;

        debug!(requested = ids.len(), affected, "records deleted");
        Ok(affected)
    }

    /// Insert `record`, replacing any row with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn upsert(&self, record: &PersistedRecord) -> Result<()> {
        sqlx::query(UPSERT_FILE)
            .bind(record.id.as_str())
            .bind(&record.name)
            .bind(clamp_i64(record.size))
            .bind(record.modified_time)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("files.upsert"))?;
        Ok(())
    }

    /// Attach or replace the `kind` aggregate of a stored file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unknown or the statement fails.
    pub async fn attach_aggregate(
        &self,
        file_id: &EntryId,
        kind: &str,
        payload: Value,
    ) -> Result<()> {
        sqlx::query(UPSERT_AGGREGATE)
            .bind(file_id.as_str())
            .bind(kind)
            .bind(Json(payload))
            .execute(&self.pool)
            .await
            .map_err(map_query_err("file_aggregates.upsert"))?;
        Ok(())
    }

    /// Number of aggregates stored for `file_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn aggregate_count(&self, file_id: &EntryId) -> Result<i64> {
        sqlx::query_scalar(COUNT_AGGREGATES)
            .bind(file_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_err("file_aggregates.count"))
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list_known_leaves(&self) -> anyhow::Result<Vec<PersistedRecord>> {
        self.load_records()
            .await
            .context("failed to load known leaves")
    }

    async fn update_modified_times(&self, updates: &[RecordUpdate]) -> anyhow::Result<()> {
        self.apply_updates(updates)
            .await
            .context("failed to update modified times")?;
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[EntryId]) -> anyhow::Result<()> {
        self.remove(ids).await.context("failed to delete records")?;
        Ok(())
    }

    async fn insert_record(&self, record: &PersistedRecord) -> anyhow::Result<()> {
        self.upsert(record)
            .await
            .with_context(|| format!("failed to insert record {}", record.id))
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_convert_to_records() {
        let row = FileRow {
            id: "abc".to_string(),
            name: "movie.mkv".to_string(),
            size: 42,
            modified_time: 1_700_000_000_000,
        };
        let record = PersistedRecord::try_from(row).expect("valid row");
        assert_eq!(record.id.as_str(), "abc");
        assert_eq!(record.size, 42);
        assert_eq!(record.modified_time, 1_700_000_000_000);
    }

    #[test]
    fn negative_sizes_are_rejected() {
        let row = FileRow {
            id: "abc".to_string(),
            name: "broken".to_string(),
            size: -5,
            modified_time: 0,
        };
        assert!(matches!(
            PersistedRecord::try_from(row),
            Err(DataError::NegativeColumn {
                column: "size",
                value: -5
            })
        ));
    }

    #[test]
    fn oversized_values_clamp() {
        assert_eq!(clamp_i64(u64::MAX), i64::MAX);
        assert_eq!(clamp_i64(7), 7);
    }
}
