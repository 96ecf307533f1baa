//! Backoff strategies for retry delays

use std::time::Duration;

/// Strategy for computing the delay before a retry attempt
pub trait BackoffStrategy: Send + Sync {
    /// Delay for the given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with a cap and optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    jitter_ratio: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter: true,
            jitter_ratio: 0.2,
        }
    }

    /// Disable jitter (deterministic delays, used in tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let range = delay.as_secs_f64() * self.jitter_ratio;
        Duration::from_secs_f64((delay.as_secs_f64() + pseudo_random(range)).max(0.0))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30), 2.0)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()));
        self.add_jitter(capped)
    }
}

/// Constant backoff, same delay for every attempt
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Clock-derived jitter, good enough to spread retries without pulling in an
/// RNG dependency.
fn pseudo_random(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let hash = nanos.wrapping_mul(2654435761);
    (hash as f64) / (u32::MAX as f64) * range
}
