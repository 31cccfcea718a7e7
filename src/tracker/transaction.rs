use std::future::Future;

use crate::board::{JobId, TrackedJob};
use crate::error::Result;
use crate::tracker::{JobTracker, TrackerState};

/// What the server returned for a successful remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Nothing to merge.
    Ack,
    /// A create went through; `job` carries the server id.
    Created { temp_id: JobId, job: TrackedJob },
    /// Server echo of a field patch.
    Fields(TrackedJob),
    /// Server echo of a status/position patch.
    Placement(TrackedJob),
}

impl JobTracker {
    /// Snapshot, apply locally, persist remotely, and either merge the
    /// confirmation or roll back.
    ///
    /// `apply` runs against the live state under the write lock and returns the
    /// request for `persist`, or `None` when the operation turned out to be a
    /// no-op (nothing is sent). An `apply` error leaves the state as it was.
    ///
    /// The mutation lock is held across the remote call, so `load` and
    /// reconciliation queue behind it. The gateway's request timeout bounds
    /// that wait; a gateway without one can stall reconciliation.
    pub(crate) async fn run_transaction<R, A, P, Fut>(
        &self,
        operation: &'static str,
        apply: A,
        persist: P,
    ) -> Result<Confirmation>
    where
        A: FnOnce(&mut TrackerState) -> Result<Option<R>>,
        P: FnOnce(R) -> Fut,
        Fut: Future<Output = Result<Confirmation>>,
    {
        let _serial = self.mutation_lock.lock().await;

        let (previous, request) = {
            let mut state = self.state.write().await;
            let previous = state.collection.clone();
            let request = match apply(&mut *state) {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(Confirmation::Ack),
                Err(e) => {
                    state.collection = previous;
                    state.status.error = Some(e.to_string());
                    drop(state);
                    self.notify();
                    tracing::debug!(operation, error = %e, "Mutation rejected locally");
                    return Err(e);
                }
            };
            state.status.pending_changes = true;
            self.save_cache(&state.collection);
            (previous, request)
        };
        self.notify();

        let outcome = match persist(request).await {
            Ok(confirmation) => {
                let mut state = self.state.write().await;
                match Self::merge_confirmation(&mut *state, &confirmation) {
                    Ok(()) => {
                        state.status.error = None;
                        self.save_cache(&state.collection);
                        drop(state);
                        self.notify();
                        tracing::debug!(operation, "Mutation confirmed by server");
                        return Ok(confirmation);
                    }
                    Err(e) => {
                        tracing::error!(operation, error = %e, "Server confirmation could not be merged");
                        e
                    }
                }
            }
            Err(e) => {
                tracing::warn!(operation, error = %e, "Remote call failed, local change rolled back");
                e
            }
        };

        let mut state = self.state.write().await;
        state.collection = previous;
        state.status.error = Some(outcome.to_string());
        self.save_cache(&state.collection);
        drop(state);
        self.notify();
        Err(outcome)
    }

    /// Fold a server confirmation into the state. An error means the
    /// confirmation contradicts the local board and the change must be undone.
    fn merge_confirmation(state: &mut TrackerState, confirmation: &Confirmation) -> Result<()> {
        match confirmation {
            Confirmation::Ack => {}
            Confirmation::Created { temp_id, job } => {
                state.collection.confirm_created(temp_id, job)?;
                state.aliases.insert(temp_id.clone(), job.id.clone());
                tracing::info!(temp_id = %temp_id, job_id = %job.id, "Job created");
            }
            Confirmation::Fields(job) => state.collection.merge_remote(job, true),
            Confirmation::Placement(job) => state.collection.merge_remote(job, false),
        }
        Ok(())
    }
}
