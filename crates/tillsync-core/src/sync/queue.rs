//! Write-time change queue.
//!
//! The queue is advisory. It shortens the gap between a local write and the
//! pass that propagates it, and lets status output report pending work. The
//! table synchronizer's timestamp scan stays authoritative, so losing queue
//! entries only delays propagation.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::Notify;

use crate::models::{ChangeOperation, QueuedChange, TrackedTable};
use crate::util::now_millis;

/// Default bound on distinct pending records
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Post-commit hook the write path depends on.
///
/// Implementations must not fail or block the caller.
pub trait WriteHook: Send + Sync {
    fn after_write(&self, change: QueuedChange);
}

/// In-memory change queue keyed by `(table, record id)`
#[derive(Debug)]
pub struct ChangeQueue {
    entries: Mutex<HashMap<(TrackedTable, String), QueuedChange>>,
    capacity: usize,
    notify: Notify,
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ChangeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Record that a row changed. Never fails; problems are logged and the
    /// change is dropped.
    pub fn enqueue(
        &self,
        operation: ChangeOperation,
        table: TrackedTable,
        record_id: &str,
        snapshot: Option<Value>,
    ) {
        let change = QueuedChange::new(operation, table, record_id, snapshot, now_millis());
        self.push(change);
    }

    fn push(&self, change: QueuedChange) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!(
                table = %change.table,
                record_id = %change.record_id,
                "Change queue lock poisoned; dropping queued change"
            );
            return;
        };

        let key = (change.table, change.record_id.clone());
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            tracing::warn!(
                table = %change.table,
                record_id = %change.record_id,
                capacity = self.capacity,
                "Change queue full; dropping queued change"
            );
            return;
        }

        tracing::trace!(
            table = %change.table,
            record_id = %change.record_id,
            operation = ?change.operation,
            "Queued change"
        );
        entries.insert(key, change);
        drop(entries);
        self.notify.notify_one();
    }

    /// Pending changes for one table, oldest first
    #[must_use]
    pub fn pending(&self, table: TrackedTable) -> Vec<QueuedChange> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut pending: Vec<_> = entries
            .values()
            .filter(|change| change.table == table)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        pending
    }

    /// Number of pending changes for one table
    #[must_use]
    pub fn pending_for(&self, table: TrackedTable) -> usize {
        self.entries.lock().map_or(0, |entries| {
            entries.keys().filter(|(t, _)| *t == table).count()
        })
    }

    /// Number of pending changes across all tables
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Drop entries for `table` queued at or before `through`.
    ///
    /// Entries queued later stay pending for the next pass. Returns the
    /// number of entries removed.
    pub fn acknowledge(&self, table: TrackedTable, through: i64) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|(t, _), change| *t != table || change.enqueued_at > through);
        before - entries.len()
    }

    /// Wait until a change is enqueued.
    ///
    /// A change queued while nobody is waiting is remembered, so the next
    /// call returns immediately.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

impl WriteHook for ChangeQueue {
    fn after_write(&self, change: QueuedChange) {
        self.push(change);
    }
}
