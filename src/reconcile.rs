use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::tracker::{JobTracker, ReconcileOutcome};

/// Periodically replaces the local board with the server's once local
/// changes are pending.
///
/// A failed fetch only sets a warning and is retried on the next tick.
pub struct ReconciliationScheduler {
    tracker: Arc<JobTracker>,
    interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(tracker: Arc<JobTracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; startup already loaded the board.
        interval.tick().await;

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Reconciliation scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reconciliation scheduler stopped");
                    break;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        match self.tracker.reconcile_if_pending().await {
            Ok(ReconcileOutcome::Skipped) => {
                tracing::trace!("No pending changes, reconciliation skipped");
            }
            Ok(ReconcileOutcome::Synced { jobs }) => {
                tracing::debug!(jobs, "Reconciliation tick applied server state");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Reconciliation failed, retrying next tick");
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation rejected server state");
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
