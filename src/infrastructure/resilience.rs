//! Resilience patterns for platform API calls

use std::time::Duration;

use rand::Rng;

use crate::application::errors::{ApiError, EngineError};

/// Retry configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add up to one second of random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(64),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Execute a function with exponential backoff retry logic.
///
/// Transient failures (429, 5xx, timeouts, transport errors) are retried
/// until `max_attempts` is exhausted. A 429 carrying a Retry-After hint
/// waits at least that long instead of the computed backoff.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempts >= config.max_attempts {
                    return Err(error);
                }

                if !is_retryable_error(&error) {
                    return Err(error);
                }

                let mut wait = delay;
                if let Some(hint) = retry_after_hint(&error) {
                    if hint > wait {
                        wait = hint;
                    }
                }
                if config.jitter {
                    wait += Duration::from_millis(rand::thread_rng().gen_range(0..1000));
                }

                tracing::debug!(
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis(),
                    error = %error,
                    "Retrying operation with exponential backoff"
                );

                tokio::time::sleep(wait).await;

                delay = std::cmp::min(
                    Duration::from_millis(
                        (delay.as_millis() as f64 * config.backoff_multiplier) as u64,
                    ),
                    config.max_delay,
                );
            }
        }
    }
}

/// Check if an error is retryable
pub fn is_retryable_error(error: &EngineError) -> bool {
    match error {
        EngineError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        EngineError::Timeout { .. } => true,
        EngineError::Api(ApiError::Http { status, .. }) => *status >= 500 || *status == 429,
        EngineError::Api(ApiError::RateLimited { .. }) => true,
        _ => false,
    }
}

/// Server-supplied minimum wait, present on rate-limit responses
fn retry_after_hint(error: &EngineError) -> Option<Duration> {
    match error {
        EngineError::Api(ApiError::RateLimited {
            retry_after_secs: Some(secs),
        }) => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}
