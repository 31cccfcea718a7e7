pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::board::{Column, JobDraft, JobPatch, TrackedJob};
use crate::error::Result;

pub use http::HttpGateway;

/// One row of a batch reorder request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderEntry {
    pub id: String,
    pub position: usize,
    #[serde(rename = "status")]
    pub column: Column,
}

/// Backing store the board is persisted to. Ids passed here are always
/// server-assigned.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<TrackedJob>>;

    /// Create a job; the server assigns id and position.
    async fn create(&self, draft: &JobDraft) -> Result<TrackedJob>;

    async fn patch_status(&self, id: &str, column: Column, position: usize) -> Result<TrackedJob>;

    async fn patch_fields(&self, id: &str, patch: &JobPatch) -> Result<TrackedJob>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn batch_reorder(&self, entries: &[ReorderEntry]) -> Result<()>;
}
