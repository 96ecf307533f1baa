//! Bounded retry for transient backend failures

use super::backoff::{BackoffStrategy, ExponentialBackoff};
use super::{ErrorClass, classify_error};
use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to the delays
    pub jitter: bool,
    /// Whether unclassifiable errors are retried
    pub retry_unknown: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
            retry_unknown: true,
        }
    }
}

impl RetryConfig {
    /// A config that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set total attempt count
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the initial retry delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let backoff =
            ExponentialBackoff::new(self.initial_delay, self.max_delay, self.backoff_multiplier);
        if self.jitter { backoff } else { backoff.without_jitter() }
    }
}

/// Retry policy driving an operation to completion or exhaustion
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Box<dyn BackoffStrategy>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = Box::new(config.create_backoff());
        Self { config, backoff }
    }

    /// Replace the backoff strategy
    pub fn with_backoff<B: BackoffStrategy + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Whether another attempt should be made after this error
    ///
    /// `attempt` is 0-indexed, so `max_attempts = 3` allows attempts 0, 1, 2.
    pub fn should_retry(&self, error: &GatewayError, attempt: u32) -> bool {
        if attempt + 1 >= self.config.max_attempts {
            return false;
        }
        match classify_error(error) {
            ErrorClass::Transient => true,
            ErrorClass::Permanent => false,
            ErrorClass::Unknown => self.config.retry_unknown,
        }
    }

    /// Run an operation with retries, returning the last error on exhaustion
    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        cancel_token: Option<&CancellationToken>,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 0;

        loop {
            if let Some(token) = cancel_token {
                if token.is_cancelled() {
                    return Err(GatewayError::Cancelled);
                }
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }

                    let delay = self.backoff.delay_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    attempt += 1;

                    match cancel_token {
                        Some(token) => {
                            tokio::select! {
                                _ = token.cancelled() => return Err(GatewayError::Cancelled),
                                _ = sleep(delay) => {}
                            }
                        }
                        None => sleep(delay).await,
                    }
                }
            }
        }
    }
}
