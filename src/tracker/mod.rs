//! The job tracker: an optimistic, cache-backed board kept in step with the
//! remote jobs API.
//!
//! Every mutation runs through [`JobTracker::run_transaction`]:
//! 1. snapshot the collection
//! 2. apply the change locally and mark `pending_changes`
//! 3. write the local cache (confirmed jobs only)
//! 4. call the remote gateway
//! 5. merge whatever the server confirmed (e.g. the real id of a new job)
//! 6. or, on failure, restore the snapshot in memory and in the cache and
//!    return the error
//!
//! Mutations and reconciliation are serialized by a FIFO mutex held for the
//! whole sequence, so a rollback only ever undoes its own change. Reads never
//! take that mutex and see the optimistic state while a remote call is in
//! flight.

mod sync;
mod transaction;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};

use crate::board::{
    BoardStats, Column, ColumnView, JobDraft, JobId, JobPatch, PositionedCollection, TrackedJob,
};
use crate::cache::LocalCache;
use crate::error::{Result, TrackerError};
use crate::gateway::{RemoteGateway, ReorderEntry};

pub use sync::{LoadSource, ReconcileOutcome};
pub use transaction::Confirmation;

/// Observable flags for a UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub is_loading: bool,
    pub is_syncing: bool,
    /// Local changes applied since the last successful reconciliation.
    pub pending_changes: bool,
    pub error: Option<String>,
    /// Soft problems: stale cached data, a failed background sync.
    pub warning: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub(crate) collection: PositionedCollection,
    pub(crate) status: TrackerStatus,
    /// Temp id -> server id for every create confirmed this session.
    aliases: HashMap<JobId, JobId>,
}

impl TrackerState {
    fn resolve(&self, id: &JobId) -> JobId {
        self.aliases.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// Resolve `id` and return the job's server id and current column.
    fn locate(&self, id: &JobId) -> Result<(JobId, String, Column)> {
        let id = self.resolve(id);
        let job = self
            .collection
            .get(&id)
            .ok_or_else(|| TrackerError::JobNotFound(id.clone()))?;
        let server_id = id
            .server_id()
            .ok_or_else(|| TrackerError::UnconfirmedJob(id.clone()))?
            .to_string();
        let column = job.column;
        Ok((id, server_id, column))
    }
}

pub struct JobTracker {
    state: RwLock<TrackerState>,
    mutation_lock: Mutex<()>,
    gateway: Arc<dyn RemoteGateway>,
    cache: Arc<dyn LocalCache>,
    changes: watch::Sender<u64>,
}

impl JobTracker {
    pub fn new(gateway: Arc<dyn RemoteGateway>, cache: Arc<dyn LocalCache>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: RwLock::new(TrackerState::default()),
            mutation_lock: Mutex::new(()),
            gateway,
            cache,
            changes,
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// All columns in board order with their jobs sorted by position.
    pub async fn columns(&self) -> Vec<ColumnView> {
        self.state.read().await.collection.columns()
    }

    pub async fn column(&self, column: Column) -> Vec<TrackedJob> {
        self.state
            .read()
            .await
            .collection
            .column_view(column)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn job(&self, id: &JobId) -> Option<TrackedJob> {
        let state = self.state.read().await;
        state.collection.get(&state.resolve(id)).cloned()
    }

    pub async fn jobs(&self) -> Vec<TrackedJob> {
        self.state.read().await.collection.jobs().to_vec()
    }

    pub async fn stats(&self) -> BoardStats {
        self.state.read().await.collection.stats()
    }

    pub async fn status(&self) -> TrackerStatus {
        self.state.read().await.status.clone()
    }

    /// Revision counter bumped after every visible state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.status.error = None;
        self.notify();
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Add a job at the end of `draft.column`. Returns the confirmed job.
    pub async fn add_job(&self, draft: JobDraft) -> Result<TrackedJob> {
        let gateway = Arc::clone(&self.gateway);
        let confirmation = self
            .run_transaction(
                "add_job",
                |state| {
                    draft.fields.validate()?;
                    let job = TrackedJob::new(draft.clone());
                    let temp_id = job.id.clone();
                    let position = state.collection.append(job)?;
                    tracing::debug!(job_id = %temp_id, column = %draft.column, position, "Job added locally");
                    Ok(Some((temp_id, draft)))
                },
                move |(temp_id, draft)| async move {
                    gateway
                        .create(&draft)
                        .await
                        .map(|job| Confirmation::Created { temp_id, job })
                },
            )
            .await?;

        match confirmation {
            Confirmation::Created { job, .. } => Ok(self.job(&job.id).await.unwrap_or(job)),
            _ => Err(TrackerError::Remote("create returned no job".to_string())),
        }
    }

    /// Move a job from `source` to `target` at `index` (end when `None`).
    /// A same-column move is a reorder.
    pub async fn move_job(
        &self,
        id: &JobId,
        source: Column,
        target: Column,
        index: Option<usize>,
    ) -> Result<()> {
        if source == target {
            return self
                .reorder_in_column(source, id, index.unwrap_or(usize::MAX))
                .await;
        }

        let gateway = Arc::clone(&self.gateway);
        self.run_transaction(
            "move_job",
            |state| {
                let (id, server_id, actual) = state.locate(id)?;
                if actual != source {
                    return Err(TrackerError::StaleSource {
                        id,
                        expected: source,
                        actual,
                    });
                }
                let position = state.collection.move_to(&id, target, index, Utc::now())?;
                tracing::debug!(job_id = %id, from = %source, to = %target, position, "Job moved locally");
                Ok(Some((server_id, position)))
            },
            move |(server_id, position)| async move {
                gateway
                    .patch_status(&server_id, target, position)
                    .await
                    .map(Confirmation::Placement)
            },
        )
        .await?;
        Ok(())
    }

    /// Reorder a job within `column`. `new_index` past the end means last.
    pub async fn reorder_in_column(
        &self,
        column: Column,
        id: &JobId,
        new_index: usize,
    ) -> Result<()> {
        let gateway = Arc::clone(&self.gateway);
        self.run_transaction(
            "reorder_in_column",
            |state| {
                let (id, _, actual) = state.locate(id)?;
                if actual != column {
                    return Err(TrackerError::StaleSource {
                        id,
                        expected: column,
                        actual,
                    });
                }
                let current = state.collection.get(&id).map(|j| j.position);
                let last = state.collection.column_len(column).saturating_sub(1);
                if current == Some(new_index.min(last)) {
                    return Ok(None);
                }

                let position = state.collection.reorder(column, &id, new_index, Utc::now())?;
                let entries = state
                    .collection
                    .column_view(column)
                    .into_iter()
                    .map(|job| -> Result<ReorderEntry> {
                        let server_id = job
                            .id
                            .server_id()
                            .ok_or_else(|| TrackerError::UnconfirmedJob(job.id.clone()))?;
                        Ok(ReorderEntry {
                            id: server_id.to_string(),
                            position: job.position,
                            column,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                tracing::debug!(job_id = %id, column = %column, position, "Job reordered locally");
                Ok(Some(entries))
            },
            move |entries| async move {
                gateway
                    .batch_reorder(&entries)
                    .await
                    .map(|()| Confirmation::Ack)
            },
        )
        .await?;
        Ok(())
    }

    /// Update descriptive fields. Column and position are untouched.
    pub async fn update_job(&self, id: &JobId, patch: JobPatch) -> Result<TrackedJob> {
        let gateway = Arc::clone(&self.gateway);
        let mut resolved = id.clone();
        self.run_transaction(
            "update_job",
            |state| {
                patch.validate()?;
                let (id, server_id, _) = state.locate(id)?;
                state.collection.update_fields(&id, &patch, Utc::now())?;
                resolved = id;
                Ok(Some((server_id, patch)))
            },
            move |(server_id, patch)| async move {
                gateway
                    .patch_fields(&server_id, &patch)
                    .await
                    .map(Confirmation::Fields)
            },
        )
        .await?;

        match self.job(&resolved).await {
            Some(job) => Ok(job),
            None => Err(TrackerError::JobNotFound(resolved)),
        }
    }

    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        let gateway = Arc::clone(&self.gateway);
        self.run_transaction(
            "delete_job",
            |state| {
                let (id, server_id, _) = state.locate(id)?;
                let removed = state.collection.remove(&id, Utc::now())?;
                tracing::debug!(job_id = %id, column = %removed.column, position = removed.position, "Job deleted locally");
                Ok(Some(server_id))
            },
            move |server_id| async move {
                gateway
                    .delete(&server_id)
                    .await
                    .map(|()| Confirmation::Ack)
            },
        )
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Write the board to the local cache, minus jobs still awaiting their
    /// server id. Failures are logged only.
    fn save_cache(&self, collection: &PositionedCollection) {
        let result = if collection.jobs().iter().any(|j| j.id.is_temp()) {
            let mut confirmed = collection.clone();
            confirmed.drop_unconfirmed();
            self.cache.save(confirmed.jobs())
        } else {
            self.cache.save(collection.jobs())
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write board snapshot to local cache");
        }
    }
}
