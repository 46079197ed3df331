//! Shared context for CLI commands
//!
//! Holds the loaded configuration and resolves the pieces commands need:
//! credentials, the HTTP client, the response cache, and default paths.
//! Credential resolution order is CLI flag, then environment shortcut,
//! then configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::application::errors::EngineError;
use crate::config::Config;
use crate::domain::recipe::OutputFormat;
use crate::infrastructure::api::PlatformClient;
use crate::infrastructure::cache::{FileCache, ProgressStore};

/// Environment shortcut for the API token
pub const TOKEN_ENV: &str = "SCANREPORT_TOKEN";
/// Environment shortcut for the platform domain
pub const DOMAIN_ENV: &str = "SCANREPORT_DOMAIN";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("API token required. Pass --token or set {}.", TOKEN_ENV)]
    MissingToken,

    #[error("Platform domain required. Pass --domain or set {}.", DOMAIN_ENV)]
    MissingDomain,
}

/// Execution context built once at startup and shared by every command
pub struct CliContext {
    pub config: Arc<Config>,
}

impl CliContext {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn resolve_token(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| non_empty_env(TOKEN_ENV))
            .or_else(|| self.config.api.token.clone())
    }

    pub fn resolve_domain(&self, flag: Option<&str>) -> Option<String> {
        flag.map(|d| d.trim().trim_end_matches('/').to_string())
            .or_else(|| non_empty_env(DOMAIN_ENV))
            .or_else(|| self.config.api.normalized_domain())
    }

    /// Resolve both credentials, naming whichever one is missing
    pub fn require_credentials(
        &self,
        token_flag: Option<&str>,
        domain_flag: Option<&str>,
    ) -> Result<(String, String), CredentialsError> {
        let token = self
            .resolve_token(token_flag)
            .ok_or(CredentialsError::MissingToken)?;
        let domain = self
            .resolve_domain(domain_flag)
            .ok_or(CredentialsError::MissingDomain)?;
        Ok((token, domain))
    }

    /// Build the platform client, with fetch checkpointing when the cache is on
    pub fn api_client(
        &self,
        token: String,
        domain: &str,
        checkpointing: bool,
    ) -> Result<PlatformClient, EngineError> {
        let api = &self.config.api;
        let client = PlatformClient::for_domain(
            domain,
            token,
            Duration::from_secs(api.timeout_seconds),
            api.page_limit,
            api.retry.to_retry_config(),
        )?;

        Ok(match checkpointing.then(|| self.progress_store()).flatten() {
            Some(progress) => client.with_progress(progress),
            None => client,
        })
    }

    /// Response cache per the configuration; `no_cache` and any setup
    /// failure both degrade to fetching everything fresh
    pub fn file_cache(&self, no_cache: bool) -> Option<FileCache> {
        if no_cache || !self.config.cache.enabled {
            return None;
        }
        match FileCache::new(&self.config.cache.directory, self.cache_freshness()) {
            Ok(cache) => Some(cache),
            Err(err) => {
                warn!(error = %err, "Cache unavailable; fetching everything fresh");
                None
            }
        }
    }

    fn progress_store(&self) -> Option<ProgressStore> {
        match ProgressStore::new(&self.config.cache.directory, self.cache_freshness()) {
            Ok(store) => Some(store),
            Err(err) => {
                warn!(error = %err, "Fetch checkpointing unavailable");
                None
            }
        }
    }

    fn cache_freshness(&self) -> Duration {
        Duration::from_secs(self.config.cache.freshness_minutes * 60)
    }

    /// Formats a recipe falls back to when it does not name its own
    pub fn default_formats(&self) -> Vec<OutputFormat> {
        self.config
            .reports
            .formats
            .iter()
            .filter_map(|f| f.parse().ok())
            .collect()
    }

    pub fn recipes_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.reports.recipes_dir.clone())
    }

    pub fn output_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.reports.output_dir.clone())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Tokens never appear whole in logs or terminal output
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;

    fn context_with_api(api: ApiConfig) -> CliContext {
        CliContext::new(Config {
            api,
            ..Config::default()
        })
    }

    #[test]
    fn flag_beats_configured_token() {
        let ctx = context_with_api(ApiConfig {
            token: Some("from-config".to_string()),
            ..ApiConfig::default()
        });
        assert_eq!(
            ctx.resolve_token(Some("from-flag")),
            Some("from-flag".to_string())
        );
        assert_eq!(ctx.resolve_token(None), Some("from-config".to_string()));
    }

    #[test]
    fn domain_flag_is_normalized() {
        let ctx = context_with_api(ApiConfig::default());
        assert_eq!(
            ctx.resolve_domain(Some("customer.example.com/")),
            Some("customer.example.com".to_string())
        );
    }

    #[test]
    fn missing_credentials_name_the_remedy() {
        let ctx = context_with_api(ApiConfig::default());
        let err = ctx.require_credentials(None, None).unwrap_err();
        assert!(err.to_string().contains("SCANREPORT_TOKEN"));

        let err = ctx
            .require_credentials(Some("tok"), None)
            .unwrap_err();
        assert!(err.to_string().contains("SCANREPORT_DOMAIN"));
    }

    #[test]
    fn redaction_keeps_only_the_edges() {
        assert_eq!(redact_token("abcd1234wxyz"), "abcd****wxyz");
        assert_eq!(redact_token("short"), "****");
        assert_eq!(redact_token(""), "****");
    }

    #[test]
    fn default_formats_come_from_the_config() {
        let ctx = CliContext::new(Config::default());
        assert_eq!(
            ctx.default_formats(),
            vec![OutputFormat::Csv, OutputFormat::Xlsx, OutputFormat::Html]
        );
    }
}
