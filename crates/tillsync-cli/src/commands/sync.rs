use tillsync_core::services::SyncEngine;

use crate::cli::SyncDirection;
use crate::commands::common::format_report_lines;
use crate::error::CliError;

pub async fn run_sync(
    engine: &SyncEngine,
    direction: Option<SyncDirection>,
    as_json: bool,
) -> Result<(), CliError> {
    let orchestrator = engine.orchestrator();
    let report = match direction {
        None => orchestrator.sync_now().await,
        Some(SyncDirection::Push) => orchestrator.sync_to_cloud().await,
        Some(SyncDirection::Pull) => orchestrator.sync_from_cloud().await,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    if report.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(report.errors.len()))
    }
}
