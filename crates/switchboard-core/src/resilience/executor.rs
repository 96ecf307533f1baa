//! Resilient execution of a single backend call
//!
//! Wraps one call with, in order: admitted-rate acquisition, circuit-breaker
//! admission, bounded retry, and health recording keyed by backend name.
//! Retries happen inside one breaker admission, so an exhausted retry run
//! counts as a single breaker outcome.

use super::circuit_breaker::{BreakerConfig, CircuitBreakerRegistry};
use super::health::HealthRegistry;
use super::rate_limit::{LimiterRegistry, RateLimitConfig};
use super::retry::{RetryConfig, RetryPolicy};
use crate::error::{GatewayError, GatewayResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Executes backend calls under circuit breaking, retry, and rate admission
pub struct ResilientExecutor {
    breakers: Arc<CircuitBreakerRegistry>,
    limiters: Arc<LimiterRegistry>,
    health: Arc<HealthRegistry>,
    retry: RetryConfig,
}

impl ResilientExecutor {
    /// Create an executor with fresh registries
    pub fn new(breaker: BreakerConfig, retry: RetryConfig, rate_limit: RateLimitConfig) -> Self {
        let window = breaker.window;
        Self {
            breakers: Arc::new(CircuitBreakerRegistry::new(breaker)),
            limiters: Arc::new(LimiterRegistry::new(rate_limit)),
            health: Arc::new(HealthRegistry::new(window)),
            retry,
        }
    }

    /// Per-backend circuit breakers
    pub fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        self.breakers.clone()
    }

    /// Per-backend admission limiters
    pub fn limiters(&self) -> Arc<LimiterRegistry> {
        self.limiters.clone()
    }

    /// Per-backend health signals
    pub fn health(&self) -> Arc<HealthRegistry> {
        self.health.clone()
    }

    /// Execute `call` for `backend`, falling back on failure
    ///
    /// The fallback receives the terminal error (breaker rejection or the
    /// last retry error) and must produce the degraded result or re-raise
    /// deliberately; there is no silent default.
    pub async fn execute<T, F, Fut, FB, FbFut>(
        &self,
        backend: &str,
        call: F,
        fallback: FB,
    ) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
        FB: FnOnce(GatewayError) -> FbFut,
        FbFut: Future<Output = GatewayResult<T>>,
    {
        self.limiters.get(backend).acquire().await;

        let breaker = self.breakers.get(backend);
        if !breaker.try_acquire() {
            tracing::warn!(backend, "circuit open, call rejected without dispatch");
            return fallback(GatewayError::circuit_open(backend)).await;
        }

        let policy = RetryPolicy::new(self.retry.clone());
        let started = Instant::now();
        let result = policy.execute(call, None).await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                breaker.record_success();
                self.health.get(backend).record(Some(elapsed), true);
                Ok(value)
            }
            Err(error) => {
                breaker.record_failure();
                self.health.get(backend).record(None, false);
                tracing::warn!(backend, error = %error, "resilient execution failed");
                fallback(error).await
            }
        }
    }
}
