//! Sync metadata repository implementation

use std::future::Future;

use libsql::{params_from_iter, Connection, Row, Value as SqlValue};

use crate::error::{Error, Result};
use crate::models::{SyncCursors, SyncMetadata};
use crate::util::now_millis;

/// Persistence for per-table sync watermarks.
///
/// This store is the only writer of metadata rows. It performs no retries;
/// storage errors propagate to the caller.
pub trait SyncMetadataRepository: Send + Sync {
    /// Get the metadata row for a table, if one exists
    fn get(&self, table_name: &str) -> impl Future<Output = Result<Option<SyncMetadata>>> + Send;

    /// Create the row or update cursors and version in place.
    ///
    /// `last_sync_at` is stored as the later of the two cursors.
    fn upsert(
        &self,
        table_name: &str,
        cursors: SyncCursors,
        sync_version: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically bump the conflict counter; a missing row is left missing.
    ///
    /// Returns whether a row was updated.
    fn increment_conflict_count(&self, table_name: &str)
        -> impl Future<Output = Result<bool>> + Send;

    /// Delete the row so the next pass performs a full scan
    fn delete(&self, table_name: &str) -> impl Future<Output = Result<bool>> + Send;

    /// All metadata rows ordered by table name
    fn list(&self) -> impl Future<Output = Result<Vec<SyncMetadata>>> + Send;
}

/// libSQL implementation of `SyncMetadataRepository`
#[derive(Clone)]
pub struct LibSqlSyncMetadataRepository {
    conn: Connection,
}

impl LibSqlSyncMetadataRepository {
    /// Create a new repository with the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Parse a metadata row from a database row
    fn parse_metadata(row: &Row) -> Result<SyncMetadata> {
        Ok(SyncMetadata {
            table_name: row.get(0)?,
            last_sync_at: optional_millis(row, 1, "last_sync_at")?,
            sync_version: row.get(2)?,
            conflict_count: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            last_push_at: optional_millis(row, 6, "last_push_at")?,
            last_pull_at: optional_millis(row, 7, "last_pull_at")?,
        })
    }
}

const SELECT_COLUMNS: &str = "table_name, last_sync_at, sync_version, conflict_count, \
     created_at, updated_at, last_push_at, last_pull_at";

fn optional_millis(row: &Row, index: i32, column: &str) -> Result<Option<i64>> {
    match row.get_value(index)? {
        SqlValue::Null => Ok(None),
        SqlValue::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "sync_metadata.{column}: expected integer, found {other:?}"
        ))),
    }
}

impl SyncMetadataRepository for LibSqlSyncMetadataRepository {
    async fn get(&self, table_name: &str) -> Result<Option<SyncMetadata>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_metadata WHERE table_name = ?"),
                [table_name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_metadata(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        table_name: &str,
        cursors: SyncCursors,
        sync_version: i64,
    ) -> Result<()> {
        let now = now_millis();
        let millis = |value: Option<i64>| value.map_or(SqlValue::Null, SqlValue::Integer);
        self.conn
            .execute(
                "INSERT INTO sync_metadata
                    (table_name, last_sync_at, last_push_at, last_pull_at, sync_version,
                     conflict_count, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, 0, ?, ?)
                 ON CONFLICT(table_name) DO UPDATE SET
                    last_sync_at = excluded.last_sync_at,
                    last_push_at = excluded.last_push_at,
                    last_pull_at = excluded.last_pull_at,
                    sync_version = excluded.sync_version,
                    updated_at = excluded.updated_at",
                params_from_iter(vec![
                    SqlValue::Text(table_name.to_string()),
                    millis(cursors.latest()),
                    millis(cursors.push),
                    millis(cursors.pull),
                    SqlValue::Integer(sync_version),
                    SqlValue::Integer(now),
                    SqlValue::Integer(now),
                ]),
            )
            .await?;
        Ok(())
    }

    async fn increment_conflict_count(&self, table_name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_metadata
                 SET conflict_count = conflict_count + 1, updated_at = ?
                 WHERE table_name = ?",
                params_from_iter(vec![
                    SqlValue::Integer(now_millis()),
                    SqlValue::Text(table_name.to_string()),
                ]),
            )
            .await?;
        Ok(rows > 0)
    }

    async fn delete(&self, table_name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM sync_metadata WHERE table_name = ?",
                [table_name],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list(&self) -> Result<Vec<SyncMetadata>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_metadata ORDER BY table_name"),
                (),
            )
            .await?;

        let mut metadata = Vec::new();
        while let Some(row) = rows.next().await? {
            metadata.push(Self::parse_metadata(&row)?);
        }
        Ok(metadata)
    }
}
