pub mod board;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod reconcile;
pub mod shutdown;
pub mod tracker;

pub use board::{Column, JobDraft, JobId, JobPatch, TrackedJob};
pub use error::{Result, TrackerError};
pub use tracker::JobTracker;
