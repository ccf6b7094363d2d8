use std::path::{Path, PathBuf};

use serde::Serialize;
use tillsync_core::config::SyncSettings;
use tillsync_core::models::SyncStatus;
use tillsync_core::services::SyncEngine;
use tillsync_core::sync::RunReport;

use crate::error::CliError;

/// Status row as printed by `status --json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusItem {
    pub table_name: String,
    pub last_sync_at: Option<i64>,
    pub last_sync_at_iso: Option<String>,
    pub sync_version: i64,
    pub conflict_count: i64,
    pub pending_changes: usize,
}

pub fn status_to_item(status: &SyncStatus) -> StatusItem {
    StatusItem {
        table_name: status.table_name.clone(),
        last_sync_at: status.last_sync_at,
        last_sync_at_iso: status.last_sync_at.map(format_sync_timestamp),
        sync_version: status.sync_version,
        conflict_count: status.conflict_count,
        pending_changes: status.pending_changes,
    }
}

pub fn format_status_lines(statuses: &[SyncStatus]) -> Vec<String> {
    statuses
        .iter()
        .map(|status| {
            let last_sync = status
                .last_sync_at
                .map_or_else(|| "never".to_string(), format_sync_timestamp);
            format!(
                "{:<14}  {:<23}  v{:<4}  conflicts={:<4}  pending={}",
                status.table_name,
                last_sync,
                status.sync_version,
                status.conflict_count,
                status.pending_changes
            )
        })
        .collect()
}

pub fn format_report_lines(report: &RunReport) -> Vec<String> {
    let mut lines = report
        .tables
        .iter()
        .map(|table| {
            let mut line = format!(
                "{:<14}  synced={:<4}  conflicts={}",
                table.table, table.records_synced, table.conflicts
            );
            if table.failed_records > 0 {
                line.push_str(&format!("  failed={}", table.failed_records));
            }
            line
        })
        .collect::<Vec<_>>();
    lines.extend(report.errors.iter().map(|error| format!("error: {error}")));
    lines.push(format!(
        "{} table(s), {} record(s) synced, {} conflict(s) in {}ms",
        report.tables_processed,
        report.records_synced,
        report.conflicts,
        report.finished_at.saturating_sub(report.started_at)
    ));
    lines
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, settings: &SyncSettings) -> PathBuf {
    cli_db_path
        .or_else(|| settings.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tillsync")
        .join("tillsync.db")
}

pub async fn open_engine(settings: &SyncSettings, db_path: &Path) -> Result<SyncEngine, CliError> {
    if !settings.is_sync_enabled() {
        return Err(CliError::SyncNotConfigured);
    }
    Ok(SyncEngine::open(settings, db_path).await?)
}
