//! Gateway configuration
//!
//! One aggregate struct with a section per subsystem, all serde-derived with
//! humantime durations and usable defaults. Values can come from a TOML file
//! layered with `SWITCHBOARD__`-prefixed environment variables.

use crate::error::{GatewayError, GatewayResult};
use crate::resilience::adaptive::AdaptiveLimiterConfig;
use crate::resilience::circuit_breaker::BreakerConfig;
use crate::resilience::rate_limit::RateLimitConfig;
use crate::resilience::retry::RetryConfig;
use crate::routing::experiment::Experiment;
use crate::routing::health_aware::HealthAwareConfig;
use crate::routing::intent::IntentRoutingConfig;
use crate::stream::guardrail::GuardrailConfig;
use crate::stream::restore::RestoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub adaptive: AdaptiveLimiterConfig,
    pub guardrail: GuardrailConfig,
    pub restore: RestoreConfig,
    pub intent: IntentRoutingConfig,
    pub health_aware: HealthAwareConfig,
    pub experiments: Vec<Experiment>,
}

impl GatewayConfig {
    /// Load configuration from a TOML file, overlaid with environment
    /// variables (`SWITCHBOARD__RETRY__MAX_ATTEMPTS=5`)
    pub fn load(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SWITCHBOARD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|error| GatewayError::config(error.to_string()))
    }
}
