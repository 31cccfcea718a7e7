use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::board::job::{Column, JobId, JobPatch, TrackedJob};
use crate::error::{Result, TrackerError};

/// One column of the board, jobs ordered by position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView {
    pub id: Column,
    pub title: &'static str,
    pub jobs: Vec<TrackedJob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    pub total: usize,
    pub by_column: BTreeMap<Column, usize>,
}

/// Flat set of tracked jobs partitioned by column.
///
/// Within each column the positions are always exactly `0..len`. Every
/// mutating method here preserves that; [`PositionedCollection::replace`]
/// refuses input that does not already satisfy it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionedCollection {
    jobs: Vec<TrackedJob>,
}

impl PositionedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: Vec<TrackedJob>) -> Result<Self> {
        Self::validate(&jobs)?;
        Ok(Self { jobs })
    }

    /// Swap in a whole new job set. Nothing changes if `jobs` is malformed.
    pub fn replace(&mut self, jobs: Vec<TrackedJob>) -> Result<()> {
        Self::validate(&jobs)?;
        self.jobs = jobs;
        Ok(())
    }

    /// Check id uniqueness and per-column position density.
    pub fn validate(jobs: &[TrackedJob]) -> Result<()> {
        let mut ids = HashSet::with_capacity(jobs.len());
        let mut positions: BTreeMap<Column, Vec<usize>> = BTreeMap::new();

        for job in jobs {
            if !ids.insert(&job.id) {
                return Err(TrackerError::InvariantViolation(format!(
                    "duplicate job id {}",
                    job.id
                )));
            }
            positions.entry(job.column).or_default().push(job.position);
        }

        for (column, mut list) in positions {
            list.sort_unstable();
            for (expected, &actual) in list.iter().enumerate() {
                if actual != expected {
                    let detail = if expected > 0 && actual == list[expected - 1] {
                        format!("duplicate position {actual} in column {column}")
                    } else {
                        format!("missing position {expected} in column {column}")
                    };
                    return Err(TrackerError::InvariantViolation(detail));
                }
            }
        }
        Ok(())
    }

    pub fn jobs(&self) -> &[TrackedJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<TrackedJob> {
        self.jobs
    }

    pub fn get(&self, id: &JobId) -> Option<&TrackedJob> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn column_len(&self, column: Column) -> usize {
        self.jobs.iter().filter(|j| j.column == column).count()
    }

    /// Jobs of one column sorted ascending by position.
    pub fn column_view(&self, column: Column) -> Vec<&TrackedJob> {
        let mut view: Vec<&TrackedJob> = self.jobs.iter().filter(|j| j.column == column).collect();
        view.sort_by_key(|j| j.position);
        view
    }

    /// Every column in board order, including empty ones.
    pub fn columns(&self) -> Vec<ColumnView> {
        Column::ALL
            .iter()
            .map(|&column| ColumnView {
                id: column,
                title: column.title(),
                jobs: self.column_view(column).into_iter().cloned().collect(),
            })
            .collect()
    }

    pub fn stats(&self) -> BoardStats {
        let mut by_column: BTreeMap<Column, usize> =
            Column::ALL.iter().map(|&c| (c, 0)).collect();
        for job in &self.jobs {
            *by_column.entry(job.column).or_default() += 1;
        }
        BoardStats {
            total: self.jobs.len(),
            by_column,
        }
    }

    /// Append a job to the end of its column. Returns the assigned position.
    pub fn append(&mut self, mut job: TrackedJob) -> Result<usize> {
        if self.contains(&job.id) {
            return Err(TrackerError::Validation(format!(
                "job {} already exists",
                job.id
            )));
        }
        let position = self.column_len(job.column);
        job.position = position;
        self.jobs.push(job);
        Ok(position)
    }

    /// Move a job to `target` at `index` (end of column when `None` or past the
    /// end). Same-column moves are handled as a reorder. Returns the final
    /// position.
    pub fn move_to(
        &mut self,
        id: &JobId,
        target: Column,
        index: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let (source, old_position) = self
            .get(id)
            .map(|j| (j.column, j.position))
            .ok_or_else(|| TrackerError::JobNotFound(id.clone()))?;

        if source == target {
            let last = self.column_len(target).saturating_sub(1);
            return self.reorder(target, id, index.unwrap_or(last), now);
        }

        let target_len = self.column_len(target);
        let index = index.map_or(target_len, |i| i.min(target_len));

        for job in self.jobs.iter_mut() {
            if &job.id == id {
                job.column = target;
                job.position = index;
                job.touch(now);
            } else if job.column == target && job.position >= index {
                job.position += 1;
                job.touch(now);
            } else if job.column == source && job.position > old_position {
                job.position -= 1;
                job.touch(now);
            }
        }
        Ok(index)
    }

    /// Move a job within its column and re-densify that column. `new_index` is
    /// clamped to the last slot. Returns the final position.
    pub fn reorder(
        &mut self,
        column: Column,
        id: &JobId,
        new_index: usize,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let actual = self
            .get(id)
            .map(|j| j.column)
            .ok_or_else(|| TrackerError::JobNotFound(id.clone()))?;
        if actual != column {
            return Err(TrackerError::StaleSource {
                id: id.clone(),
                expected: column,
                actual,
            });
        }

        let mut order: Vec<JobId> = self
            .column_view(column)
            .into_iter()
            .map(|j| j.id.clone())
            .collect();
        let from = order.iter().position(|j| j == id).unwrap_or_default();
        let moved = order.remove(from);
        let index = new_index.min(order.len());
        order.insert(index, moved);

        for job in self.jobs.iter_mut().filter(|j| j.column == column) {
            if let Some(position) = order.iter().position(|o| o == &job.id) {
                if job.position != position {
                    job.position = position;
                    job.touch(now);
                }
            }
        }
        Ok(index)
    }

    pub fn update_fields(
        &mut self,
        id: &JobId,
        patch: &JobPatch,
        now: DateTime<Utc>,
    ) -> Result<&TrackedJob> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| TrackerError::JobNotFound(id.clone()))?;
        patch.apply_to(&mut job.fields);
        job.touch(now);
        Ok(job)
    }

    /// Remove a job and close the gap it leaves in its column.
    pub fn remove(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<TrackedJob> {
        let index = self
            .jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| TrackerError::JobNotFound(id.clone()))?;
        let removed = self.jobs.remove(index);

        for job in self.jobs.iter_mut() {
            if job.column == removed.column && job.position > removed.position {
                job.position -= 1;
                job.touch(now);
            }
        }
        Ok(removed)
    }

    /// Drop jobs that still carry a temp id and close the gaps they leave.
    /// Returns how many were dropped.
    pub fn drop_unconfirmed(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| !j.id.is_temp());
        let dropped = before - self.jobs.len();
        if dropped == 0 {
            return 0;
        }

        for &column in Column::ALL.iter() {
            let mut order: Vec<usize> = (0..self.jobs.len())
                .filter(|&i| self.jobs[i].column == column)
                .collect();
            order.sort_by_key(|&i| self.jobs[i].position);
            for (position, i) in order.into_iter().enumerate() {
                self.jobs[i].position = position;
            }
        }
        dropped
    }

    /// Adopt a server-confirmed create: the temp id becomes the server id and
    /// fields/timestamps come from the server. Placement stays local.
    pub fn confirm_created(&mut self, temp_id: &JobId, confirmed: &TrackedJob) -> Result<()> {
        if confirmed.id.is_temp() {
            return Err(TrackerError::Validation(format!(
                "server returned temporary id {}",
                confirmed.id
            )));
        }
        if self.contains(&confirmed.id) {
            return Err(TrackerError::InvariantViolation(format!(
                "server id {} is already present",
                confirmed.id
            )));
        }
        let job = self
            .jobs
            .iter_mut()
            .find(|j| &j.id == temp_id)
            .ok_or_else(|| TrackerError::JobNotFound(temp_id.clone()))?;
        job.id = confirmed.id.clone();
        job.fields = confirmed.fields.clone();
        job.created_at = confirmed.created_at;
        job.updated_at = job.updated_at.max(confirmed.updated_at);
        Ok(())
    }

    /// Merge server echo of a patched job: fields and `updated_at` only.
    pub fn merge_remote(&mut self, confirmed: &TrackedJob, include_fields: bool) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.id == confirmed.id) {
            if include_fields {
                job.fields = confirmed.fields.clone();
            }
            job.touch(confirmed.updated_at);
        }
    }
}
