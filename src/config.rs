use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Base URL of the jobs REST API (without trailing slash).
    pub api_base_url: String,
    /// Where the local snapshot is kept. `None` keeps it in memory only.
    pub cache_path: Option<PathBuf>,
    /// Period of the background reconciliation tick.
    pub reconcile_interval_ms: u64,
    /// Per-request timeout for remote calls.
    pub request_timeout_ms: u64,
    pub dashboard_addr: SocketAddr,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_path: None,
            reconcile_interval_ms: 60_000,
            request_timeout_ms: 10_000,
            dashboard_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
        }
    }
}

impl TrackerConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_reconcile_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reconcile_interval_ms = interval_ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_dashboard_addr(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = addr;
        self
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
