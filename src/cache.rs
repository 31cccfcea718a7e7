//! Durable fallback snapshot of the whole board.
//!
//! The snapshot is always written whole: `FileCache` serializes into a temp file
//! in the target directory, fsyncs it and renames it over the old one, so a
//! reader sees either the previous snapshot or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::board::TrackedJob;
use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub jobs: Vec<TrackedJob>,
    pub saved_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn new(jobs: Vec<TrackedJob>) -> Self {
        Self {
            jobs,
            saved_at: Utc::now(),
        }
    }
}

pub trait LocalCache: Send + Sync {
    /// Latest snapshot, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<CacheSnapshot>>;

    /// Replace the stored snapshot with `jobs`.
    fn save(&self, jobs: &[TrackedJob]) -> Result<()>;
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| TrackerError::Io(e.error))?;

        if let Ok(d) = fs::File::open(&dir) {
            let _ = d.sync_all();
        }
        Ok(())
    }
}

impl LocalCache for FileCache {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            TrackerError::Cache(format!("corrupt snapshot {}: {e}", self.path.display()))
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, jobs: &[TrackedJob]) -> Result<()> {
        let snapshot = CacheSnapshot::new(jobs.to_vec());
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        self.write_atomic(&bytes)?;
        tracing::debug!(path = %self.path.display(), jobs = jobs.len(), "Board snapshot saved");
        Ok(())
    }
}

/// Process-local cache, for tests and runs without a cache file.
#[derive(Debug, Default)]
pub struct MemoryCache {
    snapshot: Mutex<Option<CacheSnapshot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl LocalCache for MemoryCache {
    fn load(&self) -> Result<Option<CacheSnapshot>> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| TrackerError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, jobs: &[TrackedJob]) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| TrackerError::Cache("memory cache lock poisoned".to_string()))?;
        *guard = Some(CacheSnapshot::new(jobs.to_vec()));
        Ok(())
    }
}
