//! Periodic background runner for due syncs.

use crate::orchestrator::SyncOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    tick: Duration,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, tick: Duration) -> Self {
        Self {
            orchestrator,
            tick,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` as the stop signal, e.g. a child of the service's shutdown token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start ticking on the current runtime. The first pass runs immediately.
    pub fn spawn(self) -> SchedulerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move { self.run().await });
        SchedulerHandle { cancel, task }
    }

    /// Tick until cancelled. A pass in progress is cancelled with the scheduler.
    pub async fn run(&self) {
        info!(tick_secs = self.tick.as_secs_f64(), "Sync scheduler started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.orchestrator.run_due_syncs(&self.cancel).await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "Scheduled syncs completed"),
                        Err(e) => warn!(error = %e, "Scheduled sync pass had failures"),
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the scheduler and wait for its loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync scheduler task ended abnormally");
        }
    }
}
