use tillsync_core::services::SyncEngine;

use crate::error::CliError;

pub async fn run_reset(engine: &SyncEngine, table: &str) -> Result<bool, CliError> {
    let removed = engine.orchestrator().reset_sync_status(table).await?;
    if removed {
        println!("Reset sync status for {table}; the next pass rescans it");
    } else {
        println!("{table} has no sync status to reset");
    }
    Ok(removed)
}
