//! Checkpoints for long paginated fetches so an interrupted run can resume

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::file_cache::write_atomic;
use crate::application::errors::CacheError;

/// Pages accumulated so far for one endpoint+query
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchProgress {
    /// Offset of the next page to request
    pub offset: u64,
    pub results: Vec<Value>,
}

/// Persists fetch checkpoints next to the cache entries, one
/// `{key}.progress.json` per in-flight query. A checkpoint older than the
/// cache freshness window is discarded rather than resumed.
pub struct ProgressStore {
    directory: PathBuf,
    freshness: Duration,
}

impl ProgressStore {
    pub fn new(directory: impl Into<PathBuf>, freshness: Duration) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| CacheError::Io {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory,
            freshness,
        })
    }

    /// Load a checkpoint if one exists and is still fresh
    pub fn load(&self, key: &str) -> Result<Option<FetchProgress>, CacheError> {
        let path = self.progress_path(key);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        if !self.is_fresh(&path) {
            debug!(key, "Discarding stale fetch checkpoint");
            let _ = fs::remove_file(&path);
            return Ok(None);
        }

        match serde_json::from_slice(&body) {
            Ok(progress) => Ok(Some(progress)),
            Err(e) => {
                warn!(key, error = %e, "Ignoring corrupt fetch checkpoint");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Write a checkpoint atomically so a crash mid-write never corrupts it
    pub fn save(&self, key: &str, progress: &FetchProgress) -> Result<(), CacheError> {
        let path = self.progress_path(key);
        let body = serde_json::to_vec(progress).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &body)
    }

    /// Remove the checkpoint once the fetch completes
    pub fn clear(&self, key: &str) -> Result<(), CacheError> {
        let path = self.progress_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn progress_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.progress.json", key))
    }

    fn is_fresh(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age <= self.freshness)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn save_load_clear_cycle() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), Duration::from_secs(3600)).unwrap();

        let progress = FetchProgress {
            offset: 1000,
            results: vec![json!({"id": 1}), json!({"id": 2})],
        };
        store.save("findings_abc123", &progress).unwrap();

        let loaded = store.load("findings_abc123").unwrap().unwrap();
        assert_eq!(loaded.offset, 1000);
        assert_eq!(loaded.results.len(), 2);

        store.clear("findings_abc123").unwrap();
        assert!(store.load("findings_abc123").unwrap().is_none());
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), Duration::from_secs(3600)).unwrap();
        assert!(store.load("nothing_here").unwrap().is_none());
    }

    #[test]
    fn stale_checkpoint_is_discarded() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), Duration::from_secs(3600)).unwrap();
        store
            .save("findings_abc123", &FetchProgress::default())
            .unwrap();

        let strict = ProgressStore::new(dir.path(), Duration::from_secs(0)).unwrap();
        assert!(strict.load("findings_abc123").unwrap().is_none());
        // The stale file is gone, not just skipped
        assert!(!dir.path().join("findings_abc123.progress.json").exists());
    }

    #[test]
    fn corrupt_checkpoint_is_discarded() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), Duration::from_secs(3600)).unwrap();
        std::fs::write(dir.path().join("bad.progress.json"), b"not json").unwrap();
        assert!(store.load("bad").unwrap().is_none());
    }

    #[test]
    fn clearing_absent_checkpoint_is_fine() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), Duration::from_secs(3600)).unwrap();
        store.clear("never_saved").unwrap();
    }
}
