use tillsync_core::services::SyncEngine;

use crate::commands::common::{format_status_lines, status_to_item, StatusItem};
use crate::error::CliError;

pub async fn run_status(
    engine: &SyncEngine,
    table: Option<&str>,
    as_json: bool,
) -> Result<(), CliError> {
    let orchestrator = engine.orchestrator();
    let statuses = match table {
        Some(name) => vec![orchestrator.sync_status(name).await?],
        None => orchestrator.sync_statuses().await?,
    };

    if as_json {
        let items = statuses
            .iter()
            .map(status_to_item)
            .collect::<Vec<StatusItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for line in format_status_lines(&statuses) {
        println!("{line}");
    }
    Ok(())
}
