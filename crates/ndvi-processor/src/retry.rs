//! Deadlines and bounded retries around network calls.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use cropwatch_common::{CropwatchError, CropwatchResult};

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first; 1 disables retries
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each retry)
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// No retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be >= 1".to_string());
        }
        if self.initial_delay > self.max_delay {
            return Err("retry initial_delay must not exceed max_delay".to_string());
        }
        Ok(())
    }
}

/// Fail with `Timeout` if `future` does not finish within `limit`.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, future: F) -> CropwatchResult<T>
where
    F: Future<Output = CropwatchResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(CropwatchError::Timeout(format!(
            "{} did not finish within {:?}",
            operation, limit
        ))),
    }
}

/// Run `attempt` until it succeeds, fails with a non-transient error, or
/// the attempts run out.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    mut attempt: F,
) -> CropwatchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CropwatchResult<T>>,
{
    let mut tries = 1;
    let mut delay = config.initial_delay;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && tries < config.max_attempts => {
                warn!(
                    operation,
                    error = %e,
                    attempt = tries,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                counter!("cropwatch_retries_total", "operation" => operation).increment(1);

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, config.max_delay);
                tries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
