use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::board::TrackedJob;
use crate::error::{Result, TrackerError};
use crate::tracker::{JobTracker, TrackerState};

/// Where the initial board came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum LoadSource {
    Remote { jobs: usize },
    /// The remote was unreachable; the board is the cached snapshot.
    Cache { jobs: usize, saved_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum ReconcileOutcome {
    /// Nothing pending, nothing fetched.
    Skipped,
    Synced { jobs: usize },
}

impl JobTracker {
    /// Initial load: remote first, local cache when the remote is unreachable.
    pub async fn load(&self) -> Result<LoadSource> {
        let _serial = self.mutation_lock.lock().await;
        self.state.write().await.status.is_loading = true;
        self.notify();

        let fetched = self.gateway.fetch_all().await;

        let mut state = self.state.write().await;
        state.status.is_loading = false;
        let result = match fetched {
            Ok(jobs) => self.install_remote(&mut *state, jobs).map(|jobs| {
                tracing::info!(jobs, "Board loaded from server");
                LoadSource::Remote { jobs }
            }),
            Err(e) if e.is_transient() => self.install_cached(&mut *state, e),
            Err(e) => {
                state.status.error = Some(e.to_string());
                Err(e)
            }
        };
        drop(state);
        self.notify();
        result
    }

    /// Fetch the server's board and replace the local one, pending or not.
    pub async fn sync_with_server(&self) -> Result<ReconcileOutcome> {
        self.reconcile(true).await
    }

    /// Timer entry point: only fetch when local changes await confirmation.
    pub async fn reconcile_if_pending(&self) -> Result<ReconcileOutcome> {
        self.reconcile(false).await
    }

    async fn reconcile(&self, force: bool) -> Result<ReconcileOutcome> {
        let _serial = self.mutation_lock.lock().await;
        {
            let mut state = self.state.write().await;
            if !force && !state.status.pending_changes {
                return Ok(ReconcileOutcome::Skipped);
            }
            state.status.is_syncing = true;
        }
        self.notify();

        let fetched = self.gateway.fetch_all().await;

        let mut state = self.state.write().await;
        state.status.is_syncing = false;
        let result = match fetched {
            Ok(jobs) => self.install_remote(&mut *state, jobs).map(|jobs| {
                tracing::info!(jobs, forced = force, "Board reconciled with server");
                ReconcileOutcome::Synced { jobs }
            }),
            Err(e) => {
                tracing::warn!(error = %e, forced = force, "Reconciliation fetch failed, keeping local state");
                if force {
                    state.status.warning = Some(format!("Sync failed: {e}"));
                }
                Err(e)
            }
        };
        drop(state);
        self.notify();
        result
    }

    /// Validated replace with server data. Malformed data leaves the state as
    /// it was and is reported as a hard error.
    fn install_remote(&self, state: &mut TrackerState, jobs: Vec<TrackedJob>) -> Result<usize> {
        let count = jobs.len();
        if let Err(e) = state.collection.replace(jobs) {
            tracing::error!(error = %e, "Server returned a malformed board, update rejected");
            state.status.error = Some(e.to_string());
            return Err(e);
        }
        state.status.pending_changes = false;
        state.status.last_synced = Some(Utc::now());
        state.status.error = None;
        state.status.warning = None;
        self.save_cache(&state.collection);
        Ok(count)
    }

    fn install_cached(&self, state: &mut TrackerState, remote_error: TrackerError) -> Result<LoadSource> {
        tracing::warn!(error = %remote_error, "Initial fetch failed, falling back to local cache");

        let snapshot = match self.cache.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                state.status.error = Some(remote_error.to_string());
                return Err(remote_error);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Local cache unreadable");
                state.status.error = Some(remote_error.to_string());
                return Err(remote_error);
            }
        };

        if let Err(e) = state.collection.replace(snapshot.jobs) {
            tracing::error!(error = %e, "Cached board is malformed, ignoring it");
            state.status.error = Some(remote_error.to_string());
            return Err(remote_error);
        }

        // Creates cut off before confirmation; reconciliation brings back any
        // the server did accept.
        let dropped = state.collection.drop_unconfirmed();
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded cached jobs the server never confirmed");
            self.save_cache(&state.collection);
        }

        let jobs = state.collection.len();
        // Cached data is stale until the server has been reached again.
        state.status.pending_changes = true;
        state.status.warning = Some(format!(
            "Offline: showing cached data saved at {}",
            snapshot.saved_at.to_rfc3339()
        ));
        tracing::info!(jobs, saved_at = %snapshot.saved_at, "Board loaded from local cache");
        Ok(LoadSource::Cache {
            jobs,
            saved_at: snapshot.saved_at,
        })
    }
}
