//! Health-aware rerouting
//!
//! When the backend serving the selected model is unhealthy (open breaker or
//! high error ratio), reroutes to the best-scoring healthy backend's
//! equivalent model. Scores favor low latency and low error ratio.

use super::context::RoutingContext;
use super::strategy::RoutingStrategy;
use crate::backend::Backend;
use crate::resilience::{CircuitBreakerRegistry, CircuitState, HealthRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for health-aware rerouting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthAwareConfig {
    pub enabled: bool,
    /// Error ratio at which a backend counts as unhealthy
    pub error_ratio_bound: f64,
    /// Minimum samples before the error ratio is trusted
    pub min_samples: u32,
}

impl Default for HealthAwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_ratio_bound: 0.5,
            min_samples: 5,
        }
    }
}

/// Reroutes away from unhealthy backends
pub struct HealthAwareStrategy {
    config: HealthAwareConfig,
    backends: Vec<Arc<dyn Backend>>,
    breakers: Arc<CircuitBreakerRegistry>,
    health: Arc<HealthRegistry>,
}

impl HealthAwareStrategy {
    pub fn new(
        config: HealthAwareConfig,
        backends: Vec<Arc<dyn Backend>>,
        breakers: Arc<CircuitBreakerRegistry>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            config,
            backends,
            breakers,
            health,
        }
    }

    fn is_unhealthy(&self, backend: &str) -> bool {
        if self.breakers.get(backend).state() != CircuitState::Closed {
            return true;
        }
        let snapshot = self.health.snapshot(backend);
        snapshot.samples >= self.config.min_samples
            && snapshot.error_ratio >= self.config.error_ratio_bound
    }

    /// Score a backend for rerouting; higher is better
    fn score(&self, backend: &str) -> f64 {
        let snapshot = self.health.snapshot(backend);
        let latency_ms = snapshot
            .mean_latency
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);
        (1.0 / (1.0 + latency_ms / 1000.0)) * (1.0 - snapshot.error_ratio)
    }
}

impl RoutingStrategy for HealthAwareStrategy {
    fn apply(&self, context: &RoutingContext) -> Option<RoutingContext> {
        let selected = context.selected_model();
        let serving = self
            .backends
            .iter()
            .find(|b| b.supports_model(selected))?;

        if !self.is_unhealthy(serving.name()) {
            return None;
        }

        let replacement = self
            .backends
            .iter()
            .filter(|b| b.name() != serving.name() && b.is_available())
            .filter(|b| !self.is_unhealthy(b.name()))
            .max_by(|a, b| {
                self.score(a.name())
                    .total_cmp(&self.score(b.name()))
            })?;

        let model = replacement.equivalent_model(selected);
        tracing::info!(
            from_backend = serving.name(),
            to_backend = replacement.name(),
            model = %model,
            "health-aware reroute"
        );

        let reason = format!(
            "health reroute: {} unhealthy, using {}",
            serving.name(),
            replacement.name()
        );
        Some(context.with_model(model, reason))
    }

    fn priority(&self) -> i32 {
        30
    }

    fn name(&self) -> &str {
        "health-aware"
    }

    fn enabled(&self) -> bool {
        self.config.enabled && self.backends.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::{ChatMessage, ChatRequest};

    fn mock_backend(name: &'static str, models: &'static [&'static str]) -> Arc<dyn Backend> {
        let mut backend = MockBackend::new();
        backend.expect_name().return_const(name.to_string());
        backend.expect_is_available().return_const(true);
        backend
            .expect_supports_model()
            .returning(move |m| models.contains(&m));
        backend
            .expect_equivalent_model()
            .returning(move |_| models[0].to_string());
        Arc::new(backend)
    }

    fn context() -> RoutingContext {
        RoutingContext::from_request(ChatRequest::new(
            "gpt-4",
            vec![ChatMessage::user("hello")],
        ))
    }

    #[test]
    fn test_healthy_backend_falls_through() {
        let backends = vec![
            mock_backend("openai", &["gpt-4"]),
            mock_backend("anthropic", &["claude-3-opus"]),
        ];
        let strategy = HealthAwareStrategy::new(
            HealthAwareConfig::default(),
            backends,
            Arc::new(CircuitBreakerRegistry::default()),
            Arc::new(HealthRegistry::default()),
        );

        assert!(strategy.apply(&context()).is_none());
    }

    #[test]
    fn test_reroutes_when_error_ratio_high() {
        let backends = vec![
            mock_backend("openai", &["gpt-4"]),
            mock_backend("anthropic", &["claude-3-opus"]),
        ];
        let health = Arc::new(HealthRegistry::default());
        for _ in 0..5 {
            health.get("openai").record(None, false);
        }

        let strategy = HealthAwareStrategy::new(
            HealthAwareConfig::default(),
            backends,
            Arc::new(CircuitBreakerRegistry::default()),
            health,
        );

        let result = strategy.apply(&context()).expect("should reroute");
        assert_eq!(result.selected_model(), "claude-3-opus");
        assert!(result.routing_reason().unwrap().contains("health reroute"));
    }

    #[test]
    fn test_no_healthy_replacement_falls_through() {
        let backends = vec![mock_backend("openai", &["gpt-4"])];
        let health = Arc::new(HealthRegistry::default());
        for _ in 0..5 {
            health.get("openai").record(None, false);
        }

        let strategy = HealthAwareStrategy::new(
            HealthAwareConfig::default(),
            backends,
            Arc::new(CircuitBreakerRegistry::default()),
            health,
        );

        assert!(strategy.apply(&context()).is_none());
    }
}
