//! Retry with exponential backoff for vendor calls
//!
//! Used by the connection layer to absorb transient vendor failures (connect
//! errors, 429s, 5xx) before a failure is reported upwards. Jitter keeps many
//! concurrent requests from hammering a recovering vendor in lockstep.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Backoff policy for one provider's HTTP calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Retries after the first attempt (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Randomise delays
    #[serde(default = "default_true")]
    pub jitter_enabled: bool,

    /// Jitter as a fraction of the delay (0.0 - 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

const fn default_initial_delay() -> u64 {
    100
}

const fn default_max_delay() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

const fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
            jitter_enabled: default_true(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Create a policy with custom parameters and default jitter
    #[must_use]
    pub const fn new(
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            max_retries,
            jitter_enabled: true,
            jitter_factor: 0.1,
        }
    }

    /// Short delays for interactive requests
    #[must_use]
    pub const fn fast() -> Self {
        Self::new(50, 1000, 2.0, 2)
    }

    /// Long delays for batch or background work
    #[must_use]
    pub const fn slow() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_retries: 5,
            jitter_enabled: true,
            jitter_factor: 0.2,
        }
    }

    /// Never retry
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 1.0, 0)
    }

    /// Disable jitter (deterministic delays, mostly for tests)
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, then jittered.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter_enabled && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Errors that know whether repeating the call may help
pub trait Retryable {
    /// Returns true if this error is retryable
    fn is_retryable(&self) -> bool;
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// Final result
    pub result: Result<T, E>,
    /// Attempts made (1 = no retries)
    pub attempts: u32,
    /// Wall time including backoff sleeps
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Check if the operation succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the metadata
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// `target` only labels log lines (usually the provider name).
#[allow(clippy::cast_possible_truncation)]
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    target: &str,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        target_name = %target,
                        attempts,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Call succeeded after retries"
                    );
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            },
            Err(err) => {
                let retry_attempt = attempts - 1;

                if !err.is_retryable() || retry_attempt >= config.max_retries {
                    if err.is_retryable() {
                        warn!(
                            target_name = %target,
                            attempts,
                            error = %err,
                            "Call failed after max retries"
                        );
                    }
                    return RetryResult {
                        result: Err(err),
                        attempts,
                        total_duration: start.elapsed(),
                    };
                }

                let delay = config.delay_for_attempt(retry_attempt);
                warn!(
                    target_name = %target,
                    attempt = attempts,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Call failed, retrying"
                );

                tokio::time::sleep(delay).await;
            },
        }
    }
}
