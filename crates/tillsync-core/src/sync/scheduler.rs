//! Background sync loop driven by a timer and by local writes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

use super::orchestrator::SyncOrchestrator;
use super::queue::ChangeQueue;
use super::report::RunReport;
use crate::db::{RecordRepository, SyncMetadataRepository};
use crate::state::SyncState;

/// Anything that can run a full sync pass
pub trait SyncRunner: Send + Sync + 'static {
    fn sync_now(&self) -> impl Future<Output = RunReport> + Send;
}

impl<L, R, M> SyncRunner for SyncOrchestrator<L, R, M>
where
    L: RecordRepository + 'static,
    R: RecordRepository + 'static,
    M: SyncMetadataRepository + 'static,
{
    async fn sync_now(&self) -> RunReport {
        Self::sync_now(self).await
    }
}

/// Timing for the background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Period between passes; `None` runs only on writes
    pub interval: Option<Duration>,
    /// Delay between a local write and the pass it triggers
    pub debounce: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(60)),
            debounce: Duration::from_millis(500),
        }
    }
}

/// Handle to a running background sync loop.
///
/// Dropping the handle also stops the loop once the current pass is done;
/// [`shutdown`](Self::shutdown) additionally waits for that to happen.
pub struct SyncScheduler {
    state: watch::Receiver<SyncState>,
    last_report: watch::Receiver<Option<RunReport>>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// When an interval is set the first pass starts immediately.
    pub fn spawn<S: SyncRunner>(
        runner: Arc<S>,
        queue: Arc<ChangeQueue>,
        config: ScheduleConfig,
    ) -> Self {
        let (state_tx, state) = watch::channel(SyncState::Offline);
        let (report_tx, last_report) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_loop(
            runner,
            queue,
            config,
            state_tx,
            report_tx,
            shutdown_rx,
        ));

        Self {
            state,
            last_report,
            shutdown,
            handle,
        }
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Subscribe to finished run reports
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Option<RunReport>> {
        self.last_report.clone()
    }

    /// Stop the loop, waiting for an in-flight pass to finish
    pub async fn shutdown(self) {
        // Fails only if the loop has already exited
        let _ = self.shutdown.send(true);
        if let Err(error) = self.handle.await {
            tracing::error!("Sync scheduler task failed: {error}");
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_loop<S: SyncRunner>(
    runner: Arc<S>,
    queue: Arc<ChangeQueue>,
    config: ScheduleConfig,
    state: watch::Sender<SyncState>,
    reports: watch::Sender<Option<RunReport>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = config.interval.map(|period| {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut consecutive_failures = 0_u32;

    tracing::info!(
        interval_secs = config.interval.map(|period| period.as_secs()),
        debounce_ms = u64::try_from(config.debounce.as_millis()).unwrap_or(u64::MAX),
        "Sync scheduler started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            () = tick(&mut interval) => {
                tracing::debug!("Sync scheduler tick");
            }
            () = queue.changed() => {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = time::sleep(config.debounce) => {}
                }
                tracing::debug!(pending = queue.pending_count(), "Sync triggered by local write");
            }
        }

        state.send_replace(SyncState::Syncing);
        let report = runner.sync_now().await;
        let next = SyncState::after(&report);

        if next == SyncState::Error {
            consecutive_failures += 1;
            tracing::warn!(
                consecutive_failures,
                errors = ?report.errors,
                "Sync pass failed; will retry"
            );
        } else {
            if consecutive_failures > 0 {
                tracing::info!(consecutive_failures, "Sync restored after failures");
            }
            consecutive_failures = 0;
        }

        state.send_replace(next);
        reports.send_replace(Some(report));
    }

    state.send_replace(SyncState::Offline);
    tracing::info!("Sync scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeOperation, TrackedTable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
        fail: bool,
    }

    impl SyncRunner for CountingRunner {
        async fn sync_now(&self) -> RunReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut report = RunReport::started(0);
            if self.fail {
                report.record_failure(TrackedTable::Users, "remote unreachable");
            }
            report
        }
    }

    async fn wait_for_runs(runner: &CountingRunner, at_least: usize) {
        time::timeout(Duration::from_secs(5), async {
            while runner.runs.load(Ordering::SeqCst) < at_least {
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduler did not run in time");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_triggers_debounced_pass() {
        let runner = Arc::new(CountingRunner::default());
        let queue = Arc::new(ChangeQueue::new());
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&runner),
            Arc::clone(&queue),
            ScheduleConfig {
                interval: None,
                debounce: Duration::from_millis(10),
            },
        );

        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);

        queue.enqueue(ChangeOperation::Create, TrackedTable::Products, "p-1", None);
        wait_for_runs(&runner, 1).await;

        let mut reports = scheduler.reports();
        time::timeout(Duration::from_secs(5), reports.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*scheduler.state().borrow(), SyncState::Synced);

        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interval_runs_repeatedly_and_reports_errors() {
        let runner = Arc::new(CountingRunner {
            fail: true,
            ..CountingRunner::default()
        });
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&runner),
            Arc::new(ChangeQueue::new()),
            ScheduleConfig {
                interval: Some(Duration::from_millis(10)),
                debounce: Duration::from_millis(10),
            },
        );

        wait_for_runs(&runner, 3).await;
        let mut state = scheduler.state();
        time::timeout(
            Duration::from_secs(5),
            state.wait_for(|state| *state == SyncState::Error),
        )
        .await
        .unwrap()
        .unwrap();

        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_publishes_offline() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = SyncScheduler::spawn(
            Arc::clone(&runner),
            Arc::new(ChangeQueue::new()),
            ScheduleConfig::default(),
        );
        wait_for_runs(&runner, 1).await;

        let state = scheduler.state();
        scheduler.shutdown().await;
        assert_eq!(*state.borrow(), SyncState::Offline);
    }
}
