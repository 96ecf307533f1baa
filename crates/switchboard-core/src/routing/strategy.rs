//! Routing strategy contract

use super::context::RoutingContext;

/// A pluggable routing policy
///
/// Strategies are applied in ascending priority order. Returning `Some`
/// replaces the context for the rest of the chain; returning `None` leaves
/// the previous decision untouched and the next strategy is tried. This is a
/// fallback pipeline, not a veto chain: a later strategy may override an
/// earlier one's decision.
pub trait RoutingStrategy: Send + Sync {
    /// Attempt to apply this strategy, returning a rewritten context if it
    /// made a decision
    fn apply(&self, context: &RoutingContext) -> Option<RoutingContext>;

    /// Priority of this strategy (lower runs first)
    fn priority(&self) -> i32;

    /// Strategy name for logging and metrics
    fn name(&self) -> &str;

    /// Whether this strategy participates in the chain
    fn enabled(&self) -> bool {
        true
    }
}
