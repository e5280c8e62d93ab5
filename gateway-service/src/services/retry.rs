//! Retry with capped exponential backoff for forwarded calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter on top of each backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (zero-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.jitter && backoff_ms > 0 {
            let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4);
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Run `f` until it succeeds, fails with an error `retryable` rejects, or
/// the retry budget is spent.
pub async fn retry_call<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &str,
    retryable: impl Fn(&E) -> bool,
    f: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(operation, attempt = attempt + 1, "Call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_retries || !retryable(&e) {
                    return Err(e);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Call failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
