//! Response cache and fetch progress checkpoints
//!
//! Raw API responses are persisted per endpoint+query so a multi-report run
//! only pays for each query once. Half-finished paginated fetches checkpoint
//! to progress files beside the cache entries.

pub mod file_cache;
pub mod progress;

pub use file_cache::{CacheStats, FileCache};
pub use progress::{FetchProgress, ProgressStore};

use sha2::{Digest, Sha256};

use crate::domain::recipe::QueryParams;

/// Cache key for an endpoint + query combination.
///
/// The endpoint path keeps the key readable on disk; the query is collapsed
/// into a short content hash so filter strings never leak into file names.
pub fn query_key(endpoint: &str, params: &QueryParams) -> String {
    format!("{}_{}", sanitize_component(endpoint), params_hash(params))
}

/// Short SHA-256 over the canonical JSON form of the query parameters
pub fn params_hash(params: &QueryParams) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

fn sanitize_component(endpoint: &str) -> String {
    endpoint
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_key_is_stable_and_filesystem_safe() {
        let params = QueryParams {
            filter: Some("detected>=2025-01-01T00:00:00".to_string()),
            limit: Some(500),
            ..QueryParams::default()
        };

        let key = query_key("/public/v0/findings", &params);
        let again = query_key("/public/v0/findings", &params);
        assert_eq!(key, again);
        assert!(key.starts_with("public_v0_findings_"));
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn different_params_produce_different_keys() {
        let a = QueryParams {
            filter: Some("severity==critical".to_string()),
            ..QueryParams::default()
        };
        let b = QueryParams {
            filter: Some("severity==high".to_string()),
            ..QueryParams::default()
        };
        assert_ne!(
            query_key("/public/v0/findings", &a),
            query_key("/public/v0/findings", &b)
        );
    }
}
