//! Configuration validation module

use crate::config::{ApiConfig, CacheConfig, LoggingConfig, ReportsConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("API configuration error: {message}")]
    Api { message: String },

    #[error("Cache configuration error: {message}")]
    Cache { message: String },

    #[error("Reports configuration error: {message}")]
    Reports { message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },
}

impl ValidationError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn reports(message: impl Into<String>) -> Self {
        Self::Reports {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

impl Validate for ApiConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_seconds == 0 {
            return Err(ValidationError::api(
                "Request timeout must be greater than 0 seconds",
            ));
        }

        if self.page_limit == 0 || self.page_limit > 10_000 {
            return Err(ValidationError::api(format!(
                "page_limit must be in range 1-10000, got {}",
                self.page_limit
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::api(
                "retry.max_attempts must be greater than 0",
            ));
        }

        if let Some(domain) = &self.domain {
            if domain.trim().is_empty() {
                return Err(ValidationError::api("domain must not be blank when set"));
            }
        }

        Ok(())
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.freshness_minutes == 0 {
            return Err(ValidationError::cache(
                "freshness_minutes must be greater than 0 when the cache is enabled",
            ));
        }

        Ok(())
    }
}

impl Validate for ReportsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.recipes_dir.as_os_str().is_empty() {
            return Err(ValidationError::reports("recipes_dir must not be empty"));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ValidationError::reports("output_dir must not be empty"));
        }

        for format in &self.formats {
            if !matches!(format.as_str(), "csv" | "xlsx" | "html") {
                return Err(ValidationError::reports(format!(
                    "Unknown output format '{}' (supported: csv, xlsx, html)",
                    format
                )));
            }
        }

        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !matches!(
            self.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ValidationError::logging(format!(
                "Unknown log level '{}' (expected trace, debug, info, warn, or error)",
                self.level
            )));
        }

        if !matches!(self.format.as_str(), "pretty" | "json") {
            return Err(ValidationError::logging(format!(
                "Unknown log format '{}' (expected pretty or json)",
                self.format
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_page_limit() {
        let config = ApiConfig {
            page_limit: 20_000,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let zero = ApiConfig {
            page_limit: 0,
            ..ApiConfig::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn rejects_zero_freshness_when_enabled() {
        let config = CacheConfig {
            enabled: true,
            freshness_minutes: 0,
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());

        let disabled = CacheConfig {
            enabled: false,
            freshness_minutes: 0,
            ..CacheConfig::default()
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_output_format() {
        let config = ReportsConfig {
            formats: vec!["pdf".to_string()],
            ..ReportsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
