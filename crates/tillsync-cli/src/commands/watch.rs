use tillsync_core::services::SyncEngine;
use tillsync_core::sync::ScheduleConfig;

use crate::commands::common::format_report_lines;
use crate::error::CliError;

/// Run the scheduler until Ctrl-C, printing each pass as it completes.
pub async fn run_watch(engine: &SyncEngine, schedule: ScheduleConfig) -> Result<(), CliError> {
    let scheduler = engine.spawn_scheduler(schedule);
    let mut reports = scheduler.reports();
    let mut state = scheduler.state();
    println!("Watching for changes (Ctrl-C to stop)");

    let interrupted = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal,
            changed = reports.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                if let Some(report) = reports.borrow_and_update().as_ref() {
                    for line in format_report_lines(report) {
                        println!("{line}");
                    }
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                tracing::debug!(state = %current, "Sync state changed");
            }
        }
    };

    scheduler.shutdown().await;
    interrupted?;
    println!("Stopped");
    Ok(())
}
