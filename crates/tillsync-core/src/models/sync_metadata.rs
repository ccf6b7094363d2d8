//! Sync metadata model

use serde::{Deserialize, Serialize};

use super::TrackedTable;

/// Persisted watermark for one tracked table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Tracked table this row belongs to
    pub table_name: String,
    /// Most recent successful reconciliation (unix ms); `None` before the first sync
    pub last_sync_at: Option<i64>,
    /// Local rows stamped at or after this are scanned by the next push
    pub last_push_at: Option<i64>,
    /// Remote rows stamped at or after this are scanned by the next pull
    pub last_pull_at: Option<i64>,
    /// Incremented on every successful pass
    pub sync_version: i64,
    /// Cumulative conflict-skip decisions
    pub conflict_count: i64,
    /// Row creation timestamp (unix ms)
    pub created_at: i64,
    /// Row update timestamp (unix ms)
    pub updated_at: i64,
}

impl SyncMetadata {
    #[must_use]
    pub const fn cursors(&self) -> SyncCursors {
        SyncCursors {
            push: self.last_push_at,
            pull: self.last_pull_at,
        }
    }
}

/// Scan cursors of one table, one per direction.
///
/// A push only moves `push` and a pull only moves `pull`, so a pass in one
/// direction never hides rows the other direction has not scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCursors {
    pub push: Option<i64>,
    pub pull: Option<i64>,
}

impl SyncCursors {
    /// Both directions at the same point
    #[must_use]
    pub const fn both(at: Option<i64>) -> Self {
        Self { push: at, pull: at }
    }

    /// The later of the two cursors, reported as `last_sync_at`
    #[must_use]
    pub fn latest(self) -> Option<i64> {
        self.push.max(self.pull)
    }
}

/// Machine-readable status for one tracked table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub table_name: String,
    pub last_sync_at: Option<i64>,
    pub sync_version: i64,
    pub conflict_count: i64,
    /// Writes queued locally since the last acknowledged push
    pub pending_changes: usize,
}

impl SyncStatus {
    /// Build a status row, falling back to "never synced" when no metadata exists.
    #[must_use]
    pub fn from_metadata(
        table: TrackedTable,
        metadata: Option<&SyncMetadata>,
        pending_changes: usize,
    ) -> Self {
        Self {
            table_name: table.as_str().to_string(),
            last_sync_at: metadata.and_then(|meta| meta.last_sync_at),
            sync_version: metadata.map_or(0, |meta| meta.sync_version),
            conflict_count: metadata.map_or(0, |meta| meta.conflict_count),
            pending_changes,
        }
    }

    /// Whether this table has never completed a pass
    #[must_use]
    pub const fn is_never_synced(&self) -> bool {
        self.last_sync_at.is_none()
    }
}
