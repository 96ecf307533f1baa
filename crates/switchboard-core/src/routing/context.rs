//! Routing context threaded through the strategy chain

use crate::types::ChatRequest;
use std::time::Instant;

/// Context for one routing decision
///
/// Immutable by convention: every strategy application produces a new
/// context derived from the previous one, so concurrent evaluation and
/// auditing are safe. Created once per inbound request and discarded after
/// the backend call is dispatched.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    original_request: ChatRequest,
    current_request: ChatRequest,
    selected_model: String,
    routing_reason: Option<String>,
    intent_applied: bool,
    experiment_applied: bool,
    experiment_id: Option<String>,
    experiment_variant: Option<String>,
    started_at: Instant,
}

impl RoutingContext {
    /// Create the initial context from an inbound request
    pub fn from_request(request: ChatRequest) -> Self {
        let selected_model = request.model.clone();
        Self {
            original_request: request.clone(),
            current_request: request,
            selected_model,
            routing_reason: None,
            intent_applied: false,
            experiment_applied: false,
            experiment_id: None,
            experiment_variant: None,
            started_at: Instant::now(),
        }
    }

    /// Derive a context with a new model selection
    pub fn with_model(&self, model: impl Into<String>, reason: impl Into<String>) -> Self {
        let model = model.into();
        let mut derived = self.clone();
        derived.current_request = self.current_request.with_model(model.clone());
        derived.selected_model = model;
        derived.routing_reason = Some(reason.into());
        derived
    }

    /// Derive a context flagged as intent-routed
    pub fn with_intent_applied(mut self) -> Self {
        self.intent_applied = true;
        self
    }

    /// Derive a context flagged as experiment-routed
    pub fn with_experiment(mut self, id: impl Into<String>, variant: impl Into<String>) -> Self {
        self.experiment_applied = true;
        self.experiment_id = Some(id.into());
        self.experiment_variant = Some(variant.into());
        self
    }

    /// The request as originally received
    pub fn original_request(&self) -> &ChatRequest {
        &self.original_request
    }

    /// The request as currently rewritten
    pub fn request(&self) -> &ChatRequest {
        &self.current_request
    }

    /// Consume the context, yielding the request to dispatch
    pub fn into_request(self) -> ChatRequest {
        self.current_request
    }

    /// The currently selected model
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Human-readable reason for the current selection
    pub fn routing_reason(&self) -> Option<&str> {
        self.routing_reason.as_deref()
    }

    pub fn intent_applied(&self) -> bool {
        self.intent_applied
    }

    pub fn experiment_applied(&self) -> bool {
        self.experiment_applied
    }

    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    pub fn experiment_variant(&self) -> Option<&str> {
        self.experiment_variant.as_deref()
    }

    /// Time elapsed since the context was created
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4", vec![ChatMessage::user("hello")])
    }

    #[test]
    fn test_initial_context_selects_requested_model() {
        let ctx = RoutingContext::from_request(request());
        assert_eq!(ctx.selected_model(), "gpt-4");
        assert_eq!(ctx.request().model, "gpt-4");
        assert!(ctx.routing_reason().is_none());
    }

    #[test]
    fn test_with_model_derives_without_mutating() {
        let ctx = RoutingContext::from_request(request());
        let rerouted = ctx.with_model("claude-3-opus", "intent: code");

        assert_eq!(ctx.selected_model(), "gpt-4");
        assert_eq!(rerouted.selected_model(), "claude-3-opus");
        assert_eq!(rerouted.request().model, "claude-3-opus");
        assert_eq!(rerouted.original_request().model, "gpt-4");
        assert_eq!(rerouted.routing_reason(), Some("intent: code"));
    }

    #[test]
    fn test_experiment_flags() {
        let ctx = RoutingContext::from_request(request())
            .with_model("gpt-4o-mini", "A/B test")
            .with_experiment("exp-1", "treatment");

        assert!(ctx.experiment_applied());
        assert_eq!(ctx.experiment_id(), Some("exp-1"));
        assert_eq!(ctx.experiment_variant(), Some("treatment"));
    }
}
