//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retry configuration (serializable version)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigSerializable {
    /// Maximum number of attempts including the first
    pub max_attempts: u32,
    /// Initial delay between retries (in milliseconds)
    pub initial_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add up to one second of random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfigSerializable {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 1000,
            max_delay_ms: 64_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfigSerializable {
    /// Convert to the runtime RetryConfig
    pub fn to_retry_config(&self) -> crate::infrastructure::resilience::RetryConfig {
        crate::infrastructure::resilience::RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

/// Scan platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Platform domain, e.g. `acme.scanplatform.io`. A scheme prefix and
    /// trailing slashes are stripped on normalization.
    pub domain: Option<String>,
    /// API token; usually supplied via SCANREPORT_TOKEN or the CLI flag
    pub token: Option<String>,
    pub timeout_seconds: u64,
    /// Rows requested per page on list endpoints
    pub page_limit: u32,
    #[serde(default)]
    pub retry: RetryConfigSerializable,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            domain: None,
            token: None,
            timeout_seconds: 30,
            page_limit: 500,
            retry: RetryConfigSerializable::default(),
        }
    }
}

impl ApiConfig {
    /// Domain with any scheme prefix and trailing slashes removed
    pub fn normalized_domain(&self) -> Option<String> {
        self.domain.as_ref().map(|d| {
            d.trim()
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        })
    }
}

/// Response cache and progress checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Entries and progress files older than this are ignored
    pub freshness_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".scanreport_cache"),
            freshness_minutes: 60,
        }
    }
}

/// Recipe discovery and report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub recipes_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Default output formats when a recipe does not name its own
    pub formats: Vec<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            recipes_dir: PathBuf::from("recipes"),
            output_dir: PathBuf::from("reports"),
            formats: vec!["csv".to_string(), "xlsx".to_string(), "html".to_string()],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.api.validate()?;
        self.cache.validate()?;
        self.reports.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SCANREPORT").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, ignoring the default search path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigLoadError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("SCANREPORT").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
