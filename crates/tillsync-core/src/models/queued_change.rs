//! Write-time change queue entry

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TrackedTable;

/// Kind of write that produced a queued change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

/// A record that changed locally and should be propagated by the next pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedChange {
    pub operation: ChangeOperation,
    pub table: TrackedTable,
    pub record_id: String,
    /// Row payload for create/update; `None` for delete
    pub snapshot: Option<Value>,
    /// When the change was queued (unix ms)
    pub enqueued_at: i64,
}

impl QueuedChange {
    /// Build a change, discarding the snapshot for deletes.
    #[must_use]
    pub fn new(
        operation: ChangeOperation,
        table: TrackedTable,
        record_id: impl Into<String>,
        snapshot: Option<Value>,
        enqueued_at: i64,
    ) -> Self {
        let snapshot = match operation {
            ChangeOperation::Delete => None,
            ChangeOperation::Create | ChangeOperation::Update => snapshot,
        };
        Self {
            operation,
            table,
            record_id: record_id.into(),
            snapshot,
            enqueued_at,
        }
    }

    /// Returns true if this is a deletion
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.operation, ChangeOperation::Delete)
    }
}
