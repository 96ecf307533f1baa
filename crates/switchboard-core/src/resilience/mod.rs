//! Resilient execution layer
//!
//! Everything that guards a backend call:
//! - Error classification (transient vs permanent)
//! - Bounded retry with exponential backoff
//! - Per-backend circuit breakers (failure ratio over a sliding window)
//! - Per-backend health signals and adaptive rate limiting
//! - Hedged execution (race / fan-out-collect)

pub mod adaptive;
pub mod backoff;
pub mod circuit_breaker;
pub mod executor;
pub mod health;
pub mod hedging;
pub mod rate_limit;
pub mod retry;

pub use adaptive::{AdaptiveLimiter, AdaptiveLimiterConfig};
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use executor::ResilientExecutor;
pub use health::{BackendHealth, HealthRegistry, HealthSnapshot};
pub use hedging::{HedgedCall, HedgingExecutor};
pub use rate_limit::{AdmissionLimiter, LimiterRegistry, RateLimitConfig};
pub use retry::{RetryConfig, RetryPolicy};

use crate::error::GatewayError;

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on retry
    Transient,
    /// Permanent errors that will not succeed on retry
    Permanent,
    /// Unknown errors, retried within limits
    Unknown,
}

/// Classify a gateway error into a retry class
pub fn classify_error(error: &GatewayError) -> ErrorClass {
    match error {
        GatewayError::Http { message, status } => {
            if let Some(code) = status {
                return match code {
                    429 | 502 | 503 | 504 => ErrorClass::Transient,
                    401 | 403 | 404 => ErrorClass::Permanent,
                    _ => ErrorClass::Unknown,
                };
            }
            let msg = message.to_lowercase();
            if msg.contains("timeout")
                || msg.contains("connection refused")
                || msg.contains("connection reset")
                || msg.contains("429")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
            {
                ErrorClass::Transient
            } else if msg.contains("401") || msg.contains("403") || msg.contains("404") {
                ErrorClass::Permanent
            } else {
                ErrorClass::Unknown
            }
        }
        GatewayError::Backend { message, .. } => {
            let msg = message.to_lowercase();
            if msg.contains("rate limit")
                || msg.contains("timeout")
                || msg.contains("overloaded")
                || msg.contains("temporarily unavailable")
            {
                ErrorClass::Transient
            } else if msg.contains("invalid") || msg.contains("context length") {
                ErrorClass::Permanent
            } else {
                ErrorClass::Unknown
            }
        }
        GatewayError::Timeout { .. } | GatewayError::RateLimited { .. } => ErrorClass::Transient,
        // The breaker already decided this call must not run; retrying inside
        // the same admission would defeat it.
        GatewayError::CircuitOpen { .. } => ErrorClass::Permanent,
        GatewayError::AllBackendsFailed { .. }
        | GatewayError::AllCallsFailed { .. }
        | GatewayError::NoBackendAvailable { .. }
        | GatewayError::StreamAborted { .. }
        | GatewayError::Config { .. }
        | GatewayError::InvalidInput { .. }
        | GatewayError::Cancelled => ErrorClass::Permanent,
        GatewayError::Other { .. } => ErrorClass::Unknown,
    }
}
