//! Outcome types for sync passes

use serde::{Deserialize, Serialize};

use crate::models::TrackedTable;

/// Outcome of one pass over one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSyncResult {
    pub table: TrackedTable,
    /// Records written to the destination store
    pub records_synced: usize,
    /// Records skipped because the destination held a newer copy
    pub conflicts: usize,
    /// Records whose read or write failed; a non-zero value holds the watermark back
    pub failed_records: usize,
}

impl TableSyncResult {
    #[must_use]
    pub const fn new(table: TrackedTable) -> Self {
        Self {
            table,
            records_synced: 0,
            conflicts: 0,
            failed_records: 0,
        }
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed_records == 0
    }
}

/// Aggregate outcome of one orchestrated run across all tracked tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// True exactly when `errors` is empty
    pub success: bool,
    pub tables_processed: usize,
    pub records_synced: usize,
    pub conflicts: usize,
    /// One message per failed table or table with failed records
    pub errors: Vec<String>,
    pub started_at: i64,
    pub finished_at: i64,
    pub tables: Vec<TableSyncResult>,
}

impl RunReport {
    /// Start an empty, successful report
    #[must_use]
    pub fn started(started_at: i64) -> Self {
        Self {
            success: true,
            started_at,
            finished_at: started_at,
            ..Self::default()
        }
    }

    /// Record a table whose pass completed, possibly with record-level failures
    pub fn record_table(&mut self, result: TableSyncResult) {
        self.tables_processed += 1;
        self.records_synced += result.records_synced;
        self.conflicts += result.conflicts;
        if !result.is_clean() {
            self.success = false;
            self.errors.push(format!(
                "{}: {} record(s) failed to sync",
                result.table, result.failed_records
            ));
        }
        self.tables.push(result);
    }

    /// Record a table whose pass aborted
    pub fn record_failure(&mut self, table: TrackedTable, message: impl std::fmt::Display) {
        self.success = false;
        self.errors.push(format!("{table}: {message}"));
    }

    pub const fn finish(&mut self, finished_at: i64) {
        self.finished_at = finished_at;
    }
}
