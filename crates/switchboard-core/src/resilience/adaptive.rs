//! Adaptive rate control
//!
//! A background loop that watches each backend's mean latency and steers its
//! admitted rate: multiplicative decrease above the high-water mark,
//! multiplicative increase below the low-water mark, untouched in between.
//! The hysteresis band between the marks keeps the controller from
//! oscillating.

use super::health::HealthRegistry;
use super::rate_limit::LimiterRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Configuration for the adaptive control loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveLimiterConfig {
    /// Interval between control ticks
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Mean latency above which the rate is reduced
    #[serde(with = "humantime_serde")]
    pub high_latency_mark: Duration,
    /// Mean latency below which the rate is raised
    #[serde(with = "humantime_serde")]
    pub low_latency_mark: Duration,
    /// Multiplier applied when throttling down
    pub decrease_factor: f64,
    /// Multiplier applied when recovering
    pub increase_factor: f64,
    /// Rate floor in requests per second
    pub min_rate: f64,
    /// Rate ceiling in requests per second
    pub max_rate: f64,
}

impl Default for AdaptiveLimiterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            high_latency_mark: Duration::from_millis(2000),
            low_latency_mark: Duration::from_millis(500),
            decrease_factor: 0.8,
            increase_factor: 1.2,
            min_rate: 1.0,
            max_rate: 1000.0,
        }
    }
}

/// Feedback controller adjusting per-backend admitted rates
pub struct AdaptiveLimiter {
    limiters: Arc<LimiterRegistry>,
    health: Arc<HealthRegistry>,
    config: AdaptiveLimiterConfig,
}

impl AdaptiveLimiter {
    pub fn new(
        limiters: Arc<LimiterRegistry>,
        health: Arc<HealthRegistry>,
        config: AdaptiveLimiterConfig,
    ) -> Self {
        Self {
            limiters,
            health,
            config,
        }
    }

    /// Run one control tick over every backend with an active limiter
    pub fn adapt_once(&self) {
        for name in self.limiters.names() {
            self.adapt_backend(&name);
        }
    }

    fn adapt_backend(&self, backend: &str) {
        let limiter = self.limiters.get(backend);
        let Some(mean_latency) = self.health.get(backend).mean_latency() else {
            return;
        };

        let current = limiter.current_rate();
        if mean_latency > self.config.high_latency_mark {
            let new_rate = (current * self.config.decrease_factor).max(self.config.min_rate);
            if (new_rate - current).abs() > f64::EPSILON {
                tracing::info!(
                    backend,
                    mean_latency_ms = mean_latency.as_millis() as u64,
                    rate = new_rate,
                    "high latency, throttling down"
                );
                limiter.set_rate(new_rate);
            }
        } else if mean_latency < self.config.low_latency_mark {
            let new_rate = (current * self.config.increase_factor).min(self.config.max_rate);
            if (new_rate - current).abs() > f64::EPSILON {
                tracing::info!(
                    backend,
                    mean_latency_ms = mean_latency.as_millis() as u64,
                    rate = new_rate,
                    "low latency, throttling up"
                );
                limiter.set_rate(new_rate);
            }
        }
    }

    /// Spawn the periodic control loop as a background task
    ///
    /// The loop runs until the token is cancelled and is independent of
    /// request handling.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.config.tick_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("adaptive limiter loop stopped");
                        return;
                    }
                    _ = tick.tick() => self.adapt_once(),
                }
            }
        })
    }
}
