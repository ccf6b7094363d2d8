//! Per-table push and pull passes

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::queue::ChangeQueue;
use super::report::TableSyncResult;
use super::resolver::{decide, Decision, Direction};
use crate::db::{RecordRepository, SyncMetadataRepository};
use crate::error::{Error, Result};
use crate::models::{SyncCursors, TrackedRecord, TrackedTable};
use crate::util::now_millis;

/// Counts gathered while a pass runs
struct Pass {
    result: TableSyncResult,
    /// Conflicts seen before the table had a metadata row to count them in
    deferred_conflicts: usize,
}

impl Pass {
    fn new(table: TrackedTable) -> Self {
        Self {
            result: TableSyncResult::new(table),
            deferred_conflicts: 0,
        }
    }
}

/// Directions a pass runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Push,
    Pull,
    Both,
}

impl PassKind {
    const fn pushes(self) -> bool {
        matches!(self, Self::Push | Self::Both)
    }

    const fn pulls(self) -> bool {
        matches!(self, Self::Pull | Self::Both)
    }
}

/// Cursor state read at the start of a pass
#[derive(Debug, Clone, Copy)]
struct Window {
    cursors: SyncCursors,
    version: i64,
    started_at: i64,
}

impl Window {
    /// Cursors after a clean pass of `kind`
    const fn advanced(self, kind: PassKind) -> SyncCursors {
        SyncCursors {
            push: if kind.pushes() {
                Some(self.started_at)
            } else {
                self.cursors.push
            },
            pull: if kind.pulls() {
                Some(self.started_at)
            } else {
                self.cursors.pull
            },
        }
    }
}

/// Reconciles one table between the local and the remote store.
///
/// Every pass on a table holds that table's lock from the cursor read to the
/// cursor write, so concurrent callers for the same table wait their turn
/// instead of racing on the metadata row.
pub struct TableSynchronizer<L, R, M> {
    local: L,
    remote: R,
    metadata: M,
    queue: Arc<ChangeQueue>,
    locks: HashMap<TrackedTable, Mutex<()>>,
}

impl<L, R, M> TableSynchronizer<L, R, M>
where
    L: RecordRepository,
    R: RecordRepository,
    M: SyncMetadataRepository,
{
    pub fn new(local: L, remote: R, metadata: M, queue: Arc<ChangeQueue>) -> Self {
        let locks = TrackedTable::ALL
            .into_iter()
            .map(|table| (table, Mutex::new(())))
            .collect();
        Self {
            local,
            remote,
            metadata,
            queue,
            locks,
        }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn queue(&self) -> &Arc<ChangeQueue> {
        &self.queue
    }

    /// Propagate local changes for `table` to the remote store
    pub async fn push(&self, table: TrackedTable) -> Result<TableSyncResult> {
        let _guard = self.table_lock(table)?.lock().await;
        let window = self.open_window(table).await?;

        let mut pass = Pass::new(table);
        self.push_records(table, window.cursors.push, &mut pass).await?;
        self.close_window(table, window, &pass, PassKind::Push).await?;
        Ok(pass.result)
    }

    /// Propagate remote changes for `table` to the local store
    pub async fn pull(&self, table: TrackedTable) -> Result<TableSyncResult> {
        let _guard = self.table_lock(table)?.lock().await;
        let window = self.open_window(table).await?;

        let mut pass = Pass::new(table);
        self.pull_records(table, window.cursors.pull, &mut pass).await?;
        self.close_window(table, window, &pass, PassKind::Pull).await?;
        Ok(pass.result)
    }

    /// Push then pull under one lock, advancing both cursors together.
    pub async fn sync_both(&self, table: TrackedTable) -> Result<TableSyncResult> {
        let _guard = self.table_lock(table)?.lock().await;
        let window = self.open_window(table).await?;

        let mut pass = Pass::new(table);
        self.push_records(table, window.cursors.push, &mut pass).await?;
        self.pull_records(table, window.cursors.pull, &mut pass).await?;
        self.close_window(table, window, &pass, PassKind::Both).await?;
        Ok(pass.result)
    }

    /// Forget both cursors so the next pass scans the whole table.
    ///
    /// Waits for any in-flight pass on the table to finish first.
    pub async fn reset(&self, table: TrackedTable) -> Result<bool> {
        let _guard = self.table_lock(table)?.lock().await;
        let removed = self.metadata.delete(table.as_str()).await?;
        if removed {
            tracing::info!(%table, "Reset sync watermark");
        }
        Ok(removed)
    }

    fn table_lock(&self, table: TrackedTable) -> Result<&Mutex<()>> {
        self.locks
            .get(&table)
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }

    async fn open_window(&self, table: TrackedTable) -> Result<Window> {
        let started_at = now_millis();
        let metadata = self.metadata.get(table.as_str()).await?;
        Ok(Window {
            cursors: metadata.as_ref().map(|meta| meta.cursors()).unwrap_or_default(),
            version: metadata.map_or(0, |meta| meta.sync_version),
            started_at,
        })
    }

    /// Advance the cursors of the directions that ran, unless some record failed.
    async fn close_window(
        &self,
        table: TrackedTable,
        window: Window,
        pass: &Pass,
        kind: PassKind,
    ) -> Result<()> {
        if !pass.result.is_clean() {
            tracing::warn!(
                %table,
                failed = pass.result.failed_records,
                "Keeping sync watermark; some records failed"
            );
            return Ok(());
        }

        self.metadata
            .upsert(table.as_str(), window.advanced(kind), window.version + 1)
            .await?;

        for _ in 0..pass.deferred_conflicts {
            if let Err(error) = self.metadata.increment_conflict_count(table.as_str()).await {
                tracing::warn!(%table, "Failed to record deferred conflict: {error}");
                break;
            }
        }

        if kind.pushes() {
            let acknowledged = self.queue.acknowledge(table, window.started_at);
            if acknowledged > 0 {
                tracing::debug!(%table, acknowledged, "Acknowledged queued changes");
            }
        }

        tracing::info!(
            %table,
            synced = pass.result.records_synced,
            conflicts = pass.result.conflicts,
            "Advanced sync watermark to {}",
            window.started_at
        );
        Ok(())
    }

    async fn push_records(
        &self,
        table: TrackedTable,
        watermark: Option<i64>,
        pass: &mut Pass,
    ) -> Result<()> {
        let dirty = self.local.changed_since(table, watermark).await?;
        tracing::debug!(%table, dirty = dirty.len(), "Scanned local changes");

        let mut seen = HashSet::with_capacity(dirty.len());
        for record in &dirty {
            seen.insert(record.id.as_str());
            self.reconcile_counted(table, Direction::Push, record, watermark, pass)
                .await;
        }

        // Queued ids outside the scanned window are reconciled regardless of
        // their timestamp.
        for change in self.queue.pending(table) {
            if seen.contains(change.record_id.as_str()) {
                continue;
            }
            match self.local.get(table, &change.record_id).await {
                Ok(Some(record)) => {
                    self.reconcile_counted(table, Direction::Push, &record, None, pass)
                        .await;
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        %table,
                        record_id = %change.record_id,
                        "Failed to read queued record: {error}"
                    );
                    pass.result.failed_records += 1;
                }
            }
        }
        Ok(())
    }

    async fn pull_records(
        &self,
        table: TrackedTable,
        watermark: Option<i64>,
        pass: &mut Pass,
    ) -> Result<()> {
        let dirty = self.remote.changed_since(table, watermark).await?;
        tracing::debug!(%table, dirty = dirty.len(), "Scanned remote changes");

        for record in &dirty {
            self.reconcile_counted(table, Direction::Pull, record, watermark, pass)
                .await;
        }
        Ok(())
    }

    /// Reconcile one record, folding the outcome into `pass`.
    async fn reconcile_counted(
        &self,
        table: TrackedTable,
        direction: Direction,
        record: &TrackedRecord,
        watermark: Option<i64>,
        pass: &mut Pass,
    ) {
        match self.reconcile(table, direction, record, watermark).await {
            Ok(decision) if decision.is_write() => pass.result.records_synced += 1,
            Ok(Decision::ConflictSkip) => {
                pass.result.conflicts += 1;
                match self.metadata.increment_conflict_count(table.as_str()).await {
                    Ok(true) => {}
                    Ok(false) => pass.deferred_conflicts += 1,
                    Err(error) => {
                        tracing::warn!(%table, "Failed to count conflict: {error}");
                        pass.result.failed_records += 1;
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    %table,
                    %direction,
                    record_id = %record.id,
                    "Failed to sync record: {error}"
                );
                pass.result.failed_records += 1;
            }
        }
    }

    /// Look up the counterpart of `record`, decide, and apply the decision.
    async fn reconcile(
        &self,
        table: TrackedTable,
        direction: Direction,
        record: &TrackedRecord,
        watermark: Option<i64>,
    ) -> Result<Decision> {
        let counterpart = match direction {
            Direction::Push => self.remote.get(table, &record.id).await?,
            Direction::Pull => self.local.get(table, &record.id).await?,
        };
        let (local, remote) = match direction {
            Direction::Push => (Some(record), counterpart.as_ref()),
            Direction::Pull => (counterpart.as_ref(), Some(record)),
        };

        let decision = decide(local, remote, watermark, direction);
        match (decision, local, remote) {
            (Decision::InsertRemote, Some(source), _) => self.remote.insert(table, source).await?,
            (Decision::UpdateRemote, Some(source), _) => self.remote.update(table, source).await?,
            (Decision::InsertLocal, _, Some(source)) => self.local.insert(table, source).await?,
            (Decision::UpdateLocal, _, Some(source)) => self.local.update(table, source).await?,
            (Decision::ConflictSkip, _, _) => {
                tracing::debug!(%table, %direction, record_id = %record.id, "Skipped conflicting record");
            }
            _ => {}
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlRecordRepository;
    use crate::db::LibSqlSyncMetadataRepository;
    use crate::models::ChangeOperation;
    use crate::sync::testing::{product, FlakyMetadata, FlakyRecords, Stores};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Synchronizer =
        TableSynchronizer<LibSqlRecordRepository, LibSqlRecordRepository, LibSqlSyncMetadataRepository>;

    fn synchronizer(stores: &Stores) -> Synchronizer {
        TableSynchronizer::new(
            stores.local.clone(),
            stores.remote.clone(),
            stores.metadata.clone(),
            Arc::new(ChangeQueue::new()),
        )
    }

    const T: TrackedTable = TrackedTable::Products;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_inserts_missing_remote_rows() {
        let stores = Stores::open().await;
        stores.local.insert(T, &product("p-1", 10, "Espresso")).await.unwrap();
        let sync = synchronizer(&stores);

        let before = now_millis();
        let result = sync.push(T).await.unwrap();

        assert_eq!(result.records_synced, 1);
        let remote = stores.remote.get(T, "p-1").await.unwrap().unwrap();
        assert_eq!(remote.updated_at, 10);
        assert_eq!(remote.field("name"), Some(&json!("Espresso")));

        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.sync_version, 1);
        assert!(meta.last_sync_at.unwrap() >= before);
        assert_eq!(meta.last_push_at, meta.last_sync_at);
        assert_eq!(meta.last_pull_at, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_updates_older_local_rows() {
        let stores = Stores::open().await;
        stores.local.insert(T, &product("p-1", 10, "Tea")).await.unwrap();
        stores.remote.insert(T, &product("p-1", 30, "Green tea")).await.unwrap();
        let sync = synchronizer(&stores);

        let result = sync.pull(T).await.unwrap();

        assert_eq!(result.records_synced, 1);
        let local = stores.local.get(T, "p-1").await.unwrap().unwrap();
        assert_eq!(local.updated_at, 30);
        assert_eq!(local.field("name"), Some(&json!("Green tea")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_before_first_sync_is_counted_after_watermark_write() {
        let stores = Stores::open().await;
        stores.local.insert(T, &product("p-1", 10, "Old")).await.unwrap();
        stores.remote.insert(T, &product("p-1", 20, "New")).await.unwrap();
        let sync = synchronizer(&stores);

        let result = sync.push(T).await.unwrap();

        assert_eq!(result.conflicts, 1);
        assert_eq!(result.records_synced, 0);
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.conflict_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_both_reads_watermark_once() {
        let stores = Stores::open().await;
        stores
            .metadata
            .upsert("products", SyncCursors::both(Some(1_000)), 4)
            .await
            .unwrap();
        stores.local.insert(T, &product("p-local", 2_000, "Local")).await.unwrap();
        stores.remote.insert(T, &product("p-remote", 1_500, "Remote")).await.unwrap();
        let sync = synchronizer(&stores);

        let result = sync.sync_both(T).await.unwrap();

        assert_eq!(result.records_synced, 2);
        assert!(stores.remote.get(T, "p-local").await.unwrap().is_some());
        assert!(stores.local.get(T, "p-remote").await.unwrap().is_some());
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.sync_version, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_record_keeps_watermark_and_other_records_sync() {
        let stores = Stores::open().await;
        stores
            .metadata
            .upsert("products", SyncCursors::both(Some(5)), 2)
            .await
            .unwrap();
        stores.local.insert(T, &product("p-1", 10, "One")).await.unwrap();
        stores.local.insert(T, &product("p-2", 11, "Two")).await.unwrap();

        let remote = FlakyRecords::new(stores.remote.clone());
        remote.fail_reads_of("p-1");
        let sync = TableSynchronizer::new(
            stores.local.clone(),
            remote,
            stores.metadata.clone(),
            Arc::new(ChangeQueue::new()),
        );

        let result = sync.push(T).await.unwrap();

        assert_eq!(result.records_synced, 1);
        assert_eq!(result.failed_records, 1);
        assert!(stores.remote.get(T, "p-2").await.unwrap().is_some());
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.last_sync_at, Some(5));
        assert_eq!(meta.sync_version, 2);

        // The next pass re-scans the same window and finishes the job
        sync.remote().heal();
        let retry = sync.push(T).await.unwrap();
        assert_eq!(retry.records_synced, 1);
        assert_eq!(retry.failed_records, 0);
        assert!(stores.remote.get(T, "p-1").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_failure_aborts_pass() {
        let stores = Stores::open().await;
        stores.local.insert(T, &product("p-1", 10, "One")).await.unwrap();
        let remote = FlakyRecords::new(stores.remote.clone());
        remote.fail_scans_of(T);
        let sync = TableSynchronizer::new(
            stores.local.clone(),
            remote,
            stores.metadata.clone(),
            Arc::new(ChangeQueue::new()),
        );

        assert!(sync.pull(T).await.is_err());
        // Sync both pushes first, then fails scanning the remote side
        assert!(sync.sync_both(T).await.is_err());
        assert!(stores.metadata.get("products").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watermark_write_failure_propagates() {
        let stores = Stores::open().await;
        stores
            .metadata
            .upsert("products", SyncCursors::both(Some(5)), 1)
            .await
            .unwrap();
        stores.local.insert(T, &product("p-1", 10, "One")).await.unwrap();
        let metadata = FlakyMetadata::new(stores.metadata.clone());
        metadata.fail_upserts(true);
        let sync = TableSynchronizer::new(
            stores.local.clone(),
            stores.remote.clone(),
            metadata,
            Arc::new(ChangeQueue::new()),
        );

        assert!(sync.push(T).await.is_err());
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.last_sync_at, Some(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queued_record_outside_window_is_pushed() {
        let stores = Stores::open().await;
        // Watermark is ahead of the record's timestamp, as after a clock step back
        stores
            .metadata
            .upsert("products", SyncCursors::both(Some(10_000)), 1)
            .await
            .unwrap();
        stores.local.insert(T, &product("p-1", 50, "Late")).await.unwrap();

        let queue = Arc::new(ChangeQueue::new());
        queue.enqueue(ChangeOperation::Create, T, "p-1", None);
        let sync = TableSynchronizer::new(
            stores.local.clone(),
            stores.remote.clone(),
            stores.metadata.clone(),
            Arc::clone(&queue),
        );

        let result = sync.push(T).await.unwrap();

        assert_eq!(result.records_synced, 1);
        assert!(stores.remote.get(T, "p-1").await.unwrap().is_some());
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_moves_only_pull_cursor() {
        let stores = Stores::open().await;
        stores
            .metadata
            .upsert("products", SyncCursors::both(Some(1_000)), 1)
            .await
            .unwrap();
        // Written after the last sync and never queued
        stores.local.insert(T, &product("p-1", 1_200, "Scone")).await.unwrap();
        let sync = synchronizer(&stores);

        let pulled = sync.pull(T).await.unwrap();
        assert_eq!(pulled.records_synced, 0);
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.last_push_at, Some(1_000));
        assert!(meta.last_pull_at.unwrap() > 1_200);
        assert_eq!(meta.last_sync_at, meta.last_pull_at);

        let pushed = sync.push(T).await.unwrap();
        assert_eq!(pushed.records_synced, 1);
        let remote = stores.remote.get(T, "p-1").await.unwrap().unwrap();
        assert_eq!(remote.updated_at, 1_200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_leaves_queue_alone() {
        let stores = Stores::open().await;
        let queue = Arc::new(ChangeQueue::new());
        queue.enqueue(ChangeOperation::Update, T, "p-1", None);
        let sync = TableSynchronizer::new(
            stores.local.clone(),
            stores.remote.clone(),
            stores.metadata.clone(),
            Arc::clone(&queue),
        );

        sync.pull(T).await.unwrap();
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_passes_on_one_table_serialize() {
        let stores = Stores::open().await;
        for i in 0..20 {
            stores
                .local
                .insert(T, &product(&format!("p-{i:02}"), 100 + i, "Item"))
                .await
                .unwrap();
        }
        let sync = Arc::new(synchronizer(&stores));

        let first = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.push(T).await }
        });
        let second = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.push(T).await }
        });
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        // Whichever pass ran second found every record already in place
        assert_eq!(first.records_synced + second.records_synced, 20);
        let meta = stores.metadata.get("products").await.unwrap().unwrap();
        assert_eq!(meta.sync_version, 2);
    }
}
