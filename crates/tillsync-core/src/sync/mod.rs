//! Local/remote reconciliation of tracked tables.
//!
//! A run walks the table registry in order. For each table the synchronizer
//! scans the dirty set since the table's cursor for that direction, asks the
//! resolver what to do with every record, applies the decision, and advances
//! the cursor. Push and pull keep separate cursors.

mod orchestrator;
mod queue;
mod report;
mod resolver;
mod scheduler;
mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{LibSqlSyncOrchestrator, SyncOrchestrator};
pub use queue::{ChangeQueue, WriteHook, DEFAULT_QUEUE_CAPACITY};
pub use report::{RunReport, TableSyncResult};
pub use resolver::{decide, Decision, Direction};
pub use scheduler::{ScheduleConfig, SyncRunner, SyncScheduler};
pub use table::TableSynchronizer;
