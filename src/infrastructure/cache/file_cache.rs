//! File-based response cache with a freshness window and subset reuse

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::query_key;
use crate::application::errors::CacheError;
use crate::domain::recipe::QueryParams;

/// Filter columns a subset lookup may apply locally against cached rows
const LOCAL_FILTER_COLUMNS: [&str; 3] = ["type", "status", "severity"];

/// Counters surfaced in report metadata and end-of-run logs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Lookups served by locally filtering a broader cached query
    pub subset_hits: u64,
}

/// One cache entry as stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    endpoint: String,
    params: QueryParams,
    timestamp: DateTime<Utc>,
    data: Vec<Value>,
}

/// Disk cache of raw API responses, one JSON file per endpoint+query.
///
/// A lookup first tries the exact key. On a miss it scans same-endpoint
/// entries for one whose filter is the requested filter minus extra
/// `==`/`!=`/`=in=` clauses on type, status, or severity; those clauses are
/// then applied locally. One broad findings query can feed several narrower
/// recipes that way.
pub struct FileCache {
    directory: PathBuf,
    freshness: Duration,
    stats: Mutex<CacheStats>,
}

impl FileCache {
    pub fn new(directory: impl Into<PathBuf>, freshness: Duration) -> Result<Self, CacheError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| CacheError::Io {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory,
            freshness,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Look up cached rows for a query, exact key first, then subset scan
    pub fn get(&self, endpoint: &str, params: &QueryParams) -> Result<Option<Vec<Value>>, CacheError> {
        let path = self.entry_path(&query_key(endpoint, params));
        if let Some(entry) = self.read_fresh_entry(&path)? {
            debug!(endpoint, "Cache hit");
            self.bump(|s| s.hits += 1);
            return Ok(Some(entry.data));
        }

        if let Some(rows) = self.subset_lookup(endpoint, params)? {
            debug!(endpoint, rows = rows.len(), "Cache subset hit");
            self.bump(|s| s.subset_hits += 1);
            return Ok(Some(rows));
        }

        self.bump(|s| s.misses += 1);
        Ok(None)
    }

    /// Store rows for a query
    pub fn put(&self, endpoint: &str, params: &QueryParams, data: &[Value]) -> Result<(), CacheError> {
        let entry = CacheEntry {
            endpoint: endpoint.to_string(),
            params: params.clone(),
            timestamp: Utc::now(),
            data: data.to_vec(),
        };
        let path = self.entry_path(&query_key(endpoint, params));
        let body = serde_json::to_vec(&entry).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &body)?;
        self.bump(|s| s.writes += 1);
        Ok(())
    }

    /// Snapshot of the run's cache counters
    pub fn stats(&self) -> CacheStats {
        *self
            .stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Remove entries and progress files older than the freshness window.
    /// Returns the number of files removed.
    pub fn cleanup_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            let stale = match self.read_entry(&path) {
                Ok(Some(entry)) => !self.is_fresh(entry.timestamp),
                // Unreadable entries are junk either way
                _ => true,
            };
            if stale {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale cache entry");
                } else {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let reader = fs::read_dir(&self.directory).map_err(|source| CacheError::Io {
            path: self.directory.clone(),
            source,
        })?;
        let mut files = Vec::new();
        for dir_entry in reader {
            let dir_entry = dir_entry.map_err(|source| CacheError::Io {
                path: self.directory.clone(),
                source,
            })?;
            let path = dir_entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".json") && !name.ends_with(".progress.json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        match serde_json::from_slice(&body) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A corrupt entry behaves like a miss
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                Ok(None)
            }
        }
    }

    fn read_fresh_entry(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        match self.read_entry(path)? {
            Some(entry) if self.is_fresh(entry.timestamp) => Ok(Some(entry)),
            _ => Ok(None),
        }
    }

    fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        let age = Utc::now().signed_duration_since(timestamp);
        age >= chrono::TimeDelta::zero()
            && age.to_std().map(|a| a <= self.freshness).unwrap_or(false)
    }

    fn subset_lookup(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Option<Vec<Value>>, CacheError> {
        let requested_filter = match &params.filter {
            Some(f) => f.as_str(),
            None => return Ok(None),
        };

        for path in self.entry_files()? {
            let entry = match self.read_fresh_entry(&path)? {
                Some(entry) => entry,
                None => continue,
            };
            if entry.endpoint != endpoint || entry.params.archived != params.archived {
                continue;
            }
            let cached_filter = entry.params.filter.as_deref().unwrap_or("");
            if let Some(extras) = subset_extra_clauses(requested_filter, cached_filter) {
                let predicates: Option<Vec<LocalPredicate<'_>>> =
                    extras.iter().map(|c| parse_local_predicate(c)).collect();
                if let Some(predicates) = predicates {
                    let rows = entry
                        .data
                        .into_iter()
                        .filter(|row| predicates.iter().all(|p| p.matches(row)))
                        .collect();
                    return Ok(Some(rows));
                }
            }
        }
        Ok(None)
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut stats);
    }
}

/// Atomic write via temp file + rename, shared with the progress store
pub(crate) fn write_atomic(path: &Path, body: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body).map_err(|source| CacheError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// If `requested` equals `cached` plus extra clauses, return those extras.
/// Clause comparison is exact; both filters use `;`-separated conjunctions.
fn subset_extra_clauses<'a>(requested: &'a str, cached: &str) -> Option<Vec<&'a str>> {
    let requested_clauses = split_clauses(requested);
    let cached_clauses = split_clauses(cached);

    if !cached_clauses
        .iter()
        .all(|c| requested_clauses.contains(c))
    {
        return None;
    }

    Some(
        requested_clauses
            .into_iter()
            .filter(|c| !cached_clauses.contains(c))
            .collect(),
    )
}

fn split_clauses(filter: &str) -> Vec<&str> {
    filter
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect()
}

enum LocalPredicate<'a> {
    Eq(&'a str, &'a str),
    Ne(&'a str, &'a str),
    In(&'a str, Vec<&'a str>),
}

impl LocalPredicate<'_> {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Self::Eq(col, expected) => cell_string(row, col).as_deref() == Some(*expected),
            Self::Ne(col, expected) => cell_string(row, col).as_deref() != Some(*expected),
            Self::In(col, values) => cell_string(row, col)
                .map(|cell| values.contains(&cell.as_str()))
                .unwrap_or(false),
        }
    }
}

fn cell_string(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_local_predicate(clause: &str) -> Option<LocalPredicate<'_>> {
    if let Some((col, rest)) = clause.split_once("=in=") {
        let col = col.trim();
        if !LOCAL_FILTER_COLUMNS.contains(&col) {
            return None;
        }
        let inner = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
        return Some(LocalPredicate::In(
            col,
            inner.split(',').map(str::trim).collect(),
        ));
    }
    if let Some((col, value)) = clause.split_once("!=") {
        let col = col.trim();
        if !LOCAL_FILTER_COLUMNS.contains(&col) {
            return None;
        }
        return Some(LocalPredicate::Ne(col, value.trim()));
    }
    if let Some((col, value)) = clause.split_once("==") {
        let col = col.trim();
        if !LOCAL_FILTER_COLUMNS.contains(&col) {
            return None;
        }
        return Some(LocalPredicate::Eq(col, value.trim()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn findings_params(filter: &str) -> QueryParams {
        QueryParams {
            filter: Some(filter.to_string()),
            limit: Some(500),
            ..QueryParams::default()
        }
    }

    fn sample_rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "severity": "critical", "status": "open"}),
            json!({"id": 2, "severity": "high", "status": "resolved"}),
            json!({"id": 3, "severity": "critical", "status": "triaged"}),
        ]
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let params = findings_params("detected>=2025-01-01T00:00:00");

        cache
            .put("/public/v0/findings", &params, &sample_rows())
            .unwrap();
        let rows = cache.get("/public/v0/findings", &params).unwrap().unwrap();

        assert_eq!(rows.len(), 3);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn miss_on_unknown_query() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let params = findings_params("detected>=2025-01-01T00:00:00");

        assert!(cache.get("/public/v0/findings", &params).unwrap().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn stale_entries_are_misses() {
        let dir = TempDir::new().unwrap();
        let params = findings_params("detected>=2025-01-01T00:00:00");

        {
            let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
            cache
                .put("/public/v0/findings", &params, &sample_rows())
                .unwrap();
        }

        // Reopen with a zero-width freshness window
        let cache = FileCache::new(dir.path(), Duration::from_secs(0)).unwrap();
        assert!(cache.get("/public/v0/findings", &params).unwrap().is_none());
    }

    #[test]
    fn subset_lookup_filters_broader_entry_locally() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let broad = findings_params("detected>=2025-01-01T00:00:00;detected<=2025-01-31T23:59:59");
        cache
            .put("/public/v0/findings", &broad, &sample_rows())
            .unwrap();

        let narrow = findings_params(
            "detected>=2025-01-01T00:00:00;detected<=2025-01-31T23:59:59;severity==critical",
        );
        let rows = cache.get("/public/v0/findings", &narrow).unwrap().unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["severity"] == "critical"));
        assert_eq!(cache.stats().subset_hits, 1);
    }

    #[test]
    fn subset_lookup_handles_in_lists_and_rejects_unknown_columns() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let broad = findings_params("detected>=2025-01-01T00:00:00");
        cache
            .put("/public/v0/findings", &broad, &sample_rows())
            .unwrap();

        let with_in = findings_params("detected>=2025-01-01T00:00:00;status=in=(open,triaged)");
        let rows = cache.get("/public/v0/findings", &with_in).unwrap().unwrap();
        assert_eq!(rows.len(), 2);

        // risk is not a locally filterable column, so this must miss
        let unknown = findings_params("detected>=2025-01-01T00:00:00;risk==10");
        assert!(cache.get("/public/v0/findings", &unknown).unwrap().is_none());
    }

    #[test]
    fn subset_lookup_requires_matching_endpoint() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let broad = findings_params("detected>=2025-01-01T00:00:00");
        cache
            .put("/public/v0/findings", &broad, &sample_rows())
            .unwrap();

        let narrow = findings_params("detected>=2025-01-01T00:00:00;severity==critical");
        assert!(cache.get("/public/v0/scans", &narrow).unwrap().is_none());
    }

    #[test]
    fn cleanup_removes_stale_entries() {
        let dir = TempDir::new().unwrap();
        let params = findings_params("detected>=2025-01-01T00:00:00");

        {
            let cache = FileCache::new(dir.path(), Duration::from_secs(3600)).unwrap();
            cache
                .put("/public/v0/findings", &params, &sample_rows())
                .unwrap();
        }

        let cache = FileCache::new(dir.path(), Duration::from_secs(0)).unwrap();
        let removed = cache.cleanup_expired().unwrap();
        assert_eq!(removed, 1);
        assert!(cache.entry_files().unwrap().is_empty());
    }

    #[test]
    fn subset_extra_clauses_detects_supersets() {
        let extras = subset_extra_clauses("a==1;b==2;severity==high", "a==1;b==2").unwrap();
        assert_eq!(extras, vec!["severity==high"]);

        // Cached filter has a clause the request lacks: not a subset
        assert!(subset_extra_clauses("a==1", "a==1;b==2").is_none());

        // Identical filters reuse with no local filtering
        let extras = subset_extra_clauses("a==1;b==2", "b==2;a==1").unwrap();
        assert!(extras.is_empty());
    }
}
