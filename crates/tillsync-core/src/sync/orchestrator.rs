//! Runs table passes across the tracked-table registry

use std::collections::HashMap;
use std::sync::Arc;

use super::queue::ChangeQueue;
use super::report::RunReport;
use super::table::TableSynchronizer;
use crate::db::{
    LibSqlRecordRepository, LibSqlSyncMetadataRepository, RecordRepository,
    SyncMetadataRepository,
};
use crate::error::Result;
use crate::models::{SyncStatus, TableRegistry, TrackedTable};
use crate::util::now_millis;

/// Orchestrator over the libSQL stores used by the CLI and the API
pub type LibSqlSyncOrchestrator =
    SyncOrchestrator<LibSqlRecordRepository, LibSqlRecordRepository, LibSqlSyncMetadataRepository>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    ToCloud,
    FromCloud,
    Both,
}

impl RunMode {
    const fn label(self) -> &'static str {
        match self {
            Self::ToCloud => "push",
            Self::FromCloud => "pull",
            Self::Both => "sync",
        }
    }
}

/// One orchestrator per process, built from injected stores.
///
/// Tables run one after another in registry order. Each table pass is its
/// own failure boundary: an error is recorded in the report and the run moves
/// on to the next table.
pub struct SyncOrchestrator<L, R, M> {
    synchronizer: TableSynchronizer<L, R, M>,
    registry: TableRegistry,
}

impl<L, R, M> SyncOrchestrator<L, R, M>
where
    L: RecordRepository,
    R: RecordRepository,
    M: SyncMetadataRepository,
{
    pub fn new(
        local: L,
        remote: R,
        metadata: M,
        queue: Arc<ChangeQueue>,
        registry: TableRegistry,
    ) -> Self {
        Self {
            synchronizer: TableSynchronizer::new(local, remote, metadata, queue),
            registry,
        }
    }

    pub const fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<ChangeQueue> {
        self.synchronizer.queue()
    }

    pub const fn synchronizer(&self) -> &TableSynchronizer<L, R, M> {
        &self.synchronizer
    }

    /// Push local changes of every tracked table
    pub async fn sync_to_cloud(&self) -> RunReport {
        self.run(RunMode::ToCloud).await
    }

    /// Pull remote changes of every tracked table
    pub async fn sync_from_cloud(&self) -> RunReport {
        self.run(RunMode::FromCloud).await
    }

    /// Push and pull every tracked table, advancing both cursors of each table together
    pub async fn sync_now(&self) -> RunReport {
        self.run(RunMode::Both).await
    }

    async fn run(&self, mode: RunMode) -> RunReport {
        let mut report = RunReport::started(now_millis());
        tracing::info!(
            mode = mode.label(),
            tables = self.registry.len(),
            "Starting sync run"
        );

        for &table in self.registry.tables() {
            let outcome = match mode {
                RunMode::ToCloud => self.synchronizer.push(table).await,
                RunMode::FromCloud => self.synchronizer.pull(table).await,
                RunMode::Both => self.synchronizer.sync_both(table).await,
            };
            match outcome {
                Ok(result) => report.record_table(result),
                Err(error) => {
                    tracing::error!(%table, mode = mode.label(), "Table sync failed: {error}");
                    report.record_failure(table, &error);
                }
            }
        }

        report.finish(now_millis());
        if report.success {
            tracing::info!(
                mode = mode.label(),
                synced = report.records_synced,
                conflicts = report.conflicts,
                "Sync run finished"
            );
        } else {
            tracing::warn!(
                mode = mode.label(),
                errors = report.errors.len(),
                "Sync run finished with errors"
            );
        }
        report
    }

    /// Status of one registered table; tables never synced report defaults
    pub async fn sync_status(&self, table_name: &str) -> Result<SyncStatus> {
        let table = self.registry.resolve(table_name)?;
        let metadata = self.synchronizer.metadata().get(table.as_str()).await?;
        Ok(SyncStatus::from_metadata(
            table,
            metadata.as_ref(),
            self.queue().pending_for(table),
        ))
    }

    /// Status of every registered table, in registry order
    pub async fn sync_statuses(&self) -> Result<Vec<SyncStatus>> {
        let metadata: HashMap<String, _> = self
            .synchronizer
            .metadata()
            .list()
            .await?
            .into_iter()
            .map(|meta| (meta.table_name.clone(), meta))
            .collect();

        Ok(self
            .registry
            .tables()
            .iter()
            .map(|&table| {
                SyncStatus::from_metadata(
                    table,
                    metadata.get(table.as_str()),
                    self.queue().pending_for(table),
                )
            })
            .collect())
    }

    /// Delete the table's watermark, forcing a full scan on the next pass.
    ///
    /// Returns whether a watermark existed.
    pub async fn reset_sync_status(&self, table_name: &str) -> Result<bool> {
        let table = self.registry.resolve(table_name)?;
        self.synchronizer.reset(table).await
    }

    /// Resolve a table name against the registry
    pub fn resolve(&self, table_name: &str) -> Result<TrackedTable> {
        self.registry.resolve(table_name)
    }
}
