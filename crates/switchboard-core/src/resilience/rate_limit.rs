//! Admitted-rate limiting per backend
//!
//! Token bucket whose sustained rate can be adjusted at runtime by the
//! adaptive limiter. The bucket allows short bursts up to its capacity while
//! holding the long-run rate at the current admitted requests per second.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for a backend's admitted rate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Initial sustained rate in requests per second
    pub initial_rate: f64,
    /// Bucket capacity (burst allowance)
    pub burst: f64,
    /// Whether admission limiting is enabled
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_rate: 50.0,
            burst: 10.0,
            enabled: true,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with a runtime-adjustable sustained rate
pub struct AdmissionLimiter {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl AdmissionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let state = BucketState {
            rate: config.initial_rate,
            tokens: config.burst,
            last_refill: Instant::now(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Whether limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Current admitted rate in requests per second
    pub fn current_rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Replace the sustained rate, keeping accumulated tokens
    pub fn set_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        Self::refill(&mut state, self.config.burst);
        state.rate = rate;
    }

    /// Acquire one admission token, sleeping until one is available
    ///
    /// Returns the wait duration if the caller had to wait.
    pub async fn acquire(&self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }

        loop {
            let wait = {
                let mut state = self.state.lock();
                Self::refill(&mut state, self.config.burst);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return None;
                }
                let needed = 1.0 - state.tokens;
                Duration::from_secs_f64(needed / state.rate.max(f64::MIN_POSITIVE))
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "admission limiter waiting");
            tokio::time::sleep(wait).await;

            let mut state = self.state.lock();
            Self::refill(&mut state, self.config.burst);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Some(wait);
            }
            // Rate was lowered while sleeping, go around again
        }
    }

    /// Acquire one token without waiting
    pub fn try_acquire(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut state = self.state.lock();
        Self::refill(&mut state, self.config.burst);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(state: &mut BucketState, burst: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.rate).min(burst);
        state.last_refill = now;
    }
}

/// Per-backend admission limiters, created on first use
pub struct LimiterRegistry {
    limiters: DashMap<String, Arc<AdmissionLimiter>>,
    default_config: RateLimitConfig,
}

impl LimiterRegistry {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            limiters: DashMap::new(),
            default_config,
        }
    }

    /// Get or create the limiter for a backend
    pub fn get(&self, name: &str) -> Arc<AdmissionLimiter> {
        self.limiters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AdmissionLimiter::new(self.default_config.clone())))
            .clone()
    }

    /// Names of all known limiters
    pub fn names(&self) -> Vec<String> {
        self.limiters.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_empty() {
        let limiter = AdmissionLimiter::new(RateLimitConfig {
            initial_rate: 1.0,
            burst: 3.0,
            enabled: true,
        });

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_disabled_always_admits() {
        let limiter = AdmissionLimiter::new(RateLimitConfig {
            enabled: false,
            ..Default::default()
        });
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        let limiter = AdmissionLimiter::new(RateLimitConfig {
            initial_rate: 100.0,
            burst: 1.0,
            enabled: true,
        });

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_set_rate() {
        let limiter = AdmissionLimiter::new(RateLimitConfig::default());
        limiter.set_rate(8.5);
        assert!((limiter.current_rate() - 8.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_acquire_waits_when_empty() {
        let limiter = AdmissionLimiter::new(RateLimitConfig {
            initial_rate: 50.0,
            burst: 1.0,
            enabled: true,
        });

        assert!(limiter.acquire().await.is_none());
        let waited = limiter.acquire().await;
        assert!(waited.is_some());
    }
}
