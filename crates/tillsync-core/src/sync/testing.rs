//! Store doubles for sync tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::json;

use crate::db::{
    Database, LibSqlRecordRepository, LibSqlSyncMetadataRepository, RecordRepository,
    SyncMetadataRepository,
};
use crate::error::{Error, Result};
use crate::models::{SyncCursors, SyncMetadata, TrackedRecord, TrackedTable};

/// Record store that can be told to fail scans or single-record reads
pub struct FlakyRecords {
    inner: LibSqlRecordRepository,
    failing_scans: Mutex<HashSet<TrackedTable>>,
    failing_ids: Mutex<HashSet<String>>,
}

impl FlakyRecords {
    pub fn new(inner: LibSqlRecordRepository) -> Self {
        Self {
            inner,
            failing_scans: Mutex::new(HashSet::new()),
            failing_ids: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_scans_of(&self, table: TrackedTable) {
        self.failing_scans.lock().unwrap().insert(table);
    }

    pub fn fail_reads_of(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self) {
        self.failing_scans.lock().unwrap().clear();
        self.failing_ids.lock().unwrap().clear();
    }

    fn scan_fails(&self, table: TrackedTable) -> bool {
        self.failing_scans.lock().unwrap().contains(&table)
    }

    fn read_fails(&self, id: &str) -> bool {
        self.failing_ids.lock().unwrap().contains(id)
    }
}

impl RecordRepository for FlakyRecords {
    async fn changed_since(
        &self,
        table: TrackedTable,
        since: Option<i64>,
    ) -> Result<Vec<TrackedRecord>> {
        if self.scan_fails(table) {
            return Err(Error::Database(format!("{table} store unavailable")));
        }
        self.inner.changed_since(table, since).await
    }

    async fn get(&self, table: TrackedTable, id: &str) -> Result<Option<TrackedRecord>> {
        if self.read_fails(id) {
            return Err(Error::Database(format!("read of {id} timed out")));
        }
        self.inner.get(table, id).await
    }

    async fn insert(&self, table: TrackedTable, record: &TrackedRecord) -> Result<()> {
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: TrackedTable, record: &TrackedRecord) -> Result<()> {
        self.inner.update(table, record).await
    }

    async fn list(
        &self,
        table: TrackedTable,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TrackedRecord>> {
        self.inner.list(table, limit, offset).await
    }
}

/// Metadata store whose watermark writes can be switched off
pub struct FlakyMetadata {
    inner: LibSqlSyncMetadataRepository,
    fail_upserts: AtomicBool,
}

impl FlakyMetadata {
    pub const fn new(inner: LibSqlSyncMetadataRepository) -> Self {
        Self {
            inner,
            fail_upserts: AtomicBool::new(false),
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }
}

impl SyncMetadataRepository for FlakyMetadata {
    async fn get(&self, table_name: &str) -> Result<Option<SyncMetadata>> {
        self.inner.get(table_name).await
    }

    async fn upsert(
        &self,
        table_name: &str,
        cursors: SyncCursors,
        sync_version: i64,
    ) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::Database("metadata store is read-only".to_string()));
        }
        self.inner.upsert(table_name, cursors, sync_version).await
    }

    async fn increment_conflict_count(&self, table_name: &str) -> Result<bool> {
        self.inner.increment_conflict_count(table_name).await
    }

    async fn delete(&self, table_name: &str) -> Result<bool> {
        self.inner.delete(table_name).await
    }

    async fn list(&self) -> Result<Vec<SyncMetadata>> {
        self.inner.list().await
    }
}

/// A terminal database and a cloud database, both in memory
pub struct Stores {
    pub local_db: Database,
    pub remote_db: Database,
    pub local: LibSqlRecordRepository,
    pub remote: LibSqlRecordRepository,
    pub metadata: LibSqlSyncMetadataRepository,
}

impl Stores {
    pub async fn open() -> Self {
        let local_db = Database::open_in_memory().await.unwrap();
        let remote_db = Database::open_in_memory().await.unwrap();
        Self {
            local: LibSqlRecordRepository::new(local_db.connection().clone()),
            remote: LibSqlRecordRepository::new(remote_db.connection().clone()),
            metadata: LibSqlSyncMetadataRepository::new(local_db.connection().clone()),
            local_db,
            remote_db,
        }
    }
}

pub fn product(id: &str, updated_at: i64, name: &str) -> TrackedRecord {
    record(id, updated_at, &json!({"name": name, "price_cents": 450}))
}

pub fn record(id: &str, updated_at: i64, fields: &serde_json::Value) -> TrackedRecord {
    TrackedRecord {
        id: id.to_string(),
        created_at: 1,
        updated_at,
        is_deleted: false,
        fields: fields.as_object().cloned().unwrap(),
    }
}
