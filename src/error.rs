use thiserror::Error;

use crate::board::{Column, JobId};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} is in column {actual}, not {expected}")]
    StaleSource {
        id: JobId,
        expected: Column,
        actual: Column,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job {0} has not been confirmed by the server yet")]
    UnconfirmedJob(JobId),

    #[error("Position invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// Network-level failures that a later retry or reconciliation may fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::Remote(_) | TrackerError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
