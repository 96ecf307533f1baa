//! Routing strategy chain

use super::context::RoutingContext;
use super::strategy::RoutingStrategy;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Ordered chain of routing strategies
///
/// The registration list is explicit and sorted by priority once at
/// construction; there is no runtime discovery.
pub struct RoutingStrategyChain {
    strategies: Vec<Arc<dyn RoutingStrategy>>,
}

impl RoutingStrategyChain {
    /// Build a chain, sorting the strategies by ascending priority
    pub fn new(mut strategies: Vec<Arc<dyn RoutingStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());

        tracing::info!(
            count = strategies.len(),
            strategies = ?strategies.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            "initialized routing strategy chain"
        );

        Self { strategies }
    }

    /// An empty chain that leaves every context unchanged
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Apply every enabled strategy in priority order
    ///
    /// A strategy that panics is logged and skipped; it never aborts the
    /// chain. The returned context's selected model is authoritative.
    pub fn apply(&self, context: RoutingContext) -> RoutingContext {
        let mut current = context;

        for strategy in &self.strategies {
            if !strategy.enabled() {
                tracing::trace!(strategy = strategy.name(), "skipping disabled strategy");
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| strategy.apply(&current))) {
                Ok(Some(next)) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        from = current.selected_model(),
                        to = next.selected_model(),
                        "strategy applied"
                    );
                    current = next;
                }
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(strategy = strategy.name(), "strategy panicked, skipped");
                }
            }
        }

        current
    }

    /// Registered strategies, in application order
    pub fn strategies(&self) -> &[Arc<dyn RoutingStrategy>] {
        &self.strategies
    }
}
