//! Routing decision pipeline
//!
//! A request flows through an ordered chain of strategies, each of which may
//! rewrite the routing decision. The final context's selected model is
//! authoritative.

pub mod chain;
pub mod context;
pub mod experiment;
pub mod health_aware;
pub mod intent;
pub mod strategy;

pub use chain::RoutingStrategyChain;
pub use context::RoutingContext;
pub use experiment::{Experiment, ExperimentStrategy, ExperimentVariant};
pub use health_aware::{HealthAwareConfig, HealthAwareStrategy};
pub use intent::{Intent, IntentClassifier, IntentRoutingConfig, IntentStrategy};
pub use strategy::RoutingStrategy;
