//! Wiring of stores, queue, and orchestrator for one terminal process.

use std::path::Path;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::db::{Database, LibSqlRecordRepository, LibSqlSyncMetadataRepository};
use crate::error::{Error, Result};
use crate::models::TableRegistry;
use crate::sync::{ChangeQueue, LibSqlSyncOrchestrator, ScheduleConfig, SyncScheduler, WriteHook};

use super::RecordService;

/// Everything a terminal needs to write records and keep them in sync.
///
/// Built once per process and shared by reference; the orchestrator and the
/// record service share one change queue.
pub struct SyncEngine {
    _local_db: Database,
    _remote_db: Database,
    queue: Arc<ChangeQueue>,
    orchestrator: Arc<LibSqlSyncOrchestrator>,
    records: RecordService<LibSqlRecordRepository>,
}

impl SyncEngine {
    /// Open the local database at `db_path` and the configured remote store.
    pub async fn open(settings: &SyncSettings, db_path: &Path) -> Result<Self> {
        let remote = settings
            .remote
            .as_ref()
            .filter(|remote| remote.is_configured())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "No remote store configured; set TILLSYNC_REMOTE_URL".to_string(),
                )
            })?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Opening local database at {}", db_path.display());
        let local_db = Database::open(db_path).await?;
        let remote_db = Database::open_remote(remote).await?;

        Ok(Self::from_databases(
            local_db,
            remote_db,
            settings.registry.clone(),
            settings.queue_capacity,
        ))
    }

    /// Assemble an engine over already opened databases
    #[must_use]
    pub fn from_databases(
        local_db: Database,
        remote_db: Database,
        registry: TableRegistry,
        queue_capacity: usize,
    ) -> Self {
        let queue = Arc::new(ChangeQueue::with_capacity(queue_capacity));
        let local = LibSqlRecordRepository::new(local_db.connection().clone());
        let remote = LibSqlRecordRepository::new(remote_db.connection().clone());
        let metadata = LibSqlSyncMetadataRepository::new(local_db.connection().clone());

        let orchestrator = Arc::new(LibSqlSyncOrchestrator::new(
            local.clone(),
            remote,
            metadata,
            Arc::clone(&queue),
            registry,
        ));
        let records = RecordService::new(local, Arc::clone(&queue) as Arc<dyn WriteHook>);

        Self {
            _local_db: local_db,
            _remote_db: remote_db,
            queue,
            orchestrator,
            records,
        }
    }

    pub fn orchestrator(&self) -> &Arc<LibSqlSyncOrchestrator> {
        &self.orchestrator
    }

    pub const fn records(&self) -> &RecordService<LibSqlRecordRepository> {
        &self.records
    }

    pub fn queue(&self) -> &Arc<ChangeQueue> {
        &self.queue
    }

    /// Start the background loop for this engine
    #[must_use]
    pub fn spawn_scheduler(&self, schedule: ScheduleConfig) -> SyncScheduler {
        SyncScheduler::spawn(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.queue),
            schedule,
        )
    }
}
