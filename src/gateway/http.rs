use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Serialize;

use crate::board::{Column, JobDraft, JobPatch, TrackedJob};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::gateway::{RemoteGateway, ReorderEntry};

#[derive(Serialize)]
struct StatusBody {
    status: Column,
    position: usize,
}

#[derive(Serialize)]
struct ReorderBody<'a> {
    entries: &'a [ReorderEntry],
}

/// REST client for the jobs API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let raw = base_url.as_ref().trim();
        let base_url = Url::parse(raw).map_err(|e| {
            TrackerError::Validation(format!("invalid API base URL '{raw}': {e}"))
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(TrackerError::Validation(format!(
                "API base URL must be an http(s) URL, got '{raw}'"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| TrackerError::Validation(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = body.trim();
        Err(TrackerError::Remote(if body.is_empty() {
            format!("server responded {status}")
        } else {
            format!("server responded {status}: {body}")
        }))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_all(&self) -> Result<Vec<TrackedJob>> {
        let response = self.client.get(self.endpoint(&["jobs"])?).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(&self, draft: &JobDraft) -> Result<TrackedJob> {
        let response = self.client.post(self.endpoint(&["jobs"])?).json(draft).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn patch_status(&self, id: &str, column: Column, position: usize) -> Result<TrackedJob> {
        let body = StatusBody {
            status: column,
            position,
        };
        let response = self
            .client
            .patch(self.endpoint(&["jobs", id, "status"])?)
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn patch_fields(&self, id: &str, patch: &JobPatch) -> Result<TrackedJob> {
        let response = self
            .client
            .patch(self.endpoint(&["jobs", id])?)
            .json(patch)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self.client.delete(self.endpoint(&["jobs", id])?).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn batch_reorder(&self, entries: &[ReorderEntry]) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&["jobs", "reorder"])?)
            .json(&ReorderBody { entries })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn job_urls_are_percent_encoded() {
        let gateway = gateway("http://localhost:8080/api/");
        assert_eq!(
            gateway.endpoint(&["jobs"]).unwrap().as_str(),
            "http://localhost:8080/api/jobs"
        );
        assert_eq!(
            gateway.endpoint(&["jobs", "abc-123", "status"]).unwrap().as_str(),
            "http://localhost:8080/api/jobs/abc-123/status"
        );
        assert_eq!(
            gateway.endpoint(&["jobs", "a/b c"]).unwrap().as_str(),
            "http://localhost:8080/api/jobs/a%2Fb%20c"
        );
    }

    #[test]
    fn base_url_without_trailing_slash() {
        assert_eq!(
            gateway("http://localhost:8080/api").endpoint(&["jobs"]).unwrap().as_str(),
            "http://localhost:8080/api/jobs"
        );
        assert_eq!(
            gateway("http://localhost:8080").endpoint(&["jobs"]).unwrap().as_str(),
            "http://localhost:8080/jobs"
        );
    }

    #[test]
    fn invalid_base_url_fails_at_construction() {
        for bad in ["not a url", "localhost:8080/api", "mailto:jobs@example.com", "ftp://host/api"] {
            let err = HttpGateway::new(bad, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, TrackerError::Validation(_)), "{bad}: {err:?}");
        }
    }
}
