pub mod collection;
pub mod job;

pub use collection::{BoardStats, ColumnView, PositionedCollection};
pub use job::{Column, JobDraft, JobFields, JobId, JobPatch, TrackedJob};
