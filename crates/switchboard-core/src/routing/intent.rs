//! Intent-based routing
//!
//! Classifies the latest user message into a coarse task intent and, when
//! confident enough, rewrites the selected model to the one configured for
//! that intent.

use super::context::RoutingContext;
use super::strategy::RoutingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse task intent of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeGeneration,
    Reasoning,
    Creative,
    General,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::CodeGeneration => write!(f, "code_generation"),
            Intent::Reasoning => write!(f, "reasoning"),
            Intent::Creative => write!(f, "creative"),
            Intent::General => write!(f, "general"),
        }
    }
}

/// Result of classifying a request
#[derive(Debug, Clone)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

/// Keyword-based intent classifier
///
/// Counts signal words per intent category and derives a confidence from the
/// hit count: one hit is weak evidence, three or more is strong.
#[derive(Debug, Default)]
pub struct IntentClassifier;

const CODE_SIGNALS: &[&str] = &[
    "code", "function", "implement", "debug", "compile", "refactor", "bug", "script", "api",
    "class", "method", "unit test", "regex", "sql",
];

const REASONING_SIGNALS: &[&str] = &[
    "why", "explain", "analyze", "compare", "reason", "prove", "derive", "step by step",
    "logic", "evaluate", "trade-off",
];

const CREATIVE_SIGNALS: &[&str] = &[
    "story", "poem", "write a", "creative", "imagine", "fiction", "lyrics", "brainstorm",
    "slogan", "character",
];

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a piece of user text
    pub fn classify(&self, text: &str) -> IntentClassification {
        let lower = text.to_lowercase();
        let hits = |signals: &[&str]| signals.iter().filter(|s| lower.contains(**s)).count();

        let scored = [
            (Intent::CodeGeneration, hits(CODE_SIGNALS)),
            (Intent::Reasoning, hits(REASONING_SIGNALS)),
            (Intent::Creative, hits(CREATIVE_SIGNALS)),
        ];

        let (intent, count) = scored
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .unwrap_or((Intent::General, 0));

        if count == 0 {
            return IntentClassification {
                intent: Intent::General,
                confidence: 0.0,
            };
        }

        // 1 hit -> 0.5, 2 -> 0.67, 3 -> 0.75, asymptotic to 1.0
        let confidence = count as f64 / (count as f64 + 1.0);
        IntentClassification { intent, confidence }
    }
}

/// Configuration for intent-based routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentRoutingConfig {
    pub enabled: bool,
    /// Minimum classification confidence before rerouting
    pub confidence_threshold: f64,
    /// Target model per intent
    pub model_map: HashMap<Intent, String>,
}

impl Default for IntentRoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 0.6,
            model_map: HashMap::new(),
        }
    }
}

/// Routes requests to the model configured for their classified intent
pub struct IntentStrategy {
    config: IntentRoutingConfig,
    classifier: IntentClassifier,
}

impl IntentStrategy {
    pub fn new(config: IntentRoutingConfig) -> Self {
        Self {
            config,
            classifier: IntentClassifier::new(),
        }
    }
}

impl RoutingStrategy for IntentStrategy {
    fn apply(&self, context: &RoutingContext) -> Option<RoutingContext> {
        let text = context.request().latest_user_content()?;
        let classification = self.classifier.classify(text);

        if classification.confidence < self.config.confidence_threshold {
            return None;
        }
        let model = self.config.model_map.get(&classification.intent)?;

        tracing::info!(
            from = context.selected_model(),
            to = %model,
            intent = %classification.intent,
            confidence = classification.confidence,
            "intent routing applied"
        );

        let reason = format!(
            "intent {} ({:.2} confidence)",
            classification.intent, classification.confidence
        );
        Some(context.with_model(model, reason).with_intent_applied())
    }

    fn priority(&self) -> i32 {
        10
    }

    fn name(&self) -> &str {
        "intent-routing"
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.model_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ChatRequest};

    fn config() -> IntentRoutingConfig {
        IntentRoutingConfig {
            enabled: true,
            confidence_threshold: 0.6,
            model_map: HashMap::from([
                (Intent::CodeGeneration, "code-model".to_string()),
                (Intent::Reasoning, "reasoning-model".to_string()),
            ]),
        }
    }

    fn context_for(text: &str) -> RoutingContext {
        RoutingContext::from_request(ChatRequest::new("gpt-4", vec![ChatMessage::user(text)]))
    }

    #[test]
    fn test_classifier_detects_code() {
        let classification =
            IntentClassifier::new().classify("implement a function to debug this code");
        assert_eq!(classification.intent, Intent::CodeGeneration);
        assert!(classification.confidence >= 0.6);
    }

    #[test]
    fn test_classifier_defaults_to_general() {
        let classification = IntentClassifier::new().classify("hello there");
        assert_eq!(classification.intent, Intent::General);
        assert_eq!(classification.confidence, 0.0);
    }

    #[test]
    fn test_reroutes_confident_code_request() {
        let strategy = IntentStrategy::new(config());
        let result = strategy
            .apply(&context_for("implement a function to debug this code"))
            .expect("strategy should apply");

        assert_eq!(result.selected_model(), "code-model");
        assert!(result.intent_applied());
        assert!(result.routing_reason().unwrap().contains("code_generation"));
    }

    #[test]
    fn test_low_confidence_falls_through() {
        let strategy = IntentStrategy::new(config());
        // A single weak signal word stays under the 0.6 threshold
        assert!(strategy.apply(&context_for("why though")).is_none());
    }

    #[test]
    fn test_unmapped_intent_falls_through() {
        let strategy = IntentStrategy::new(IntentRoutingConfig {
            model_map: HashMap::from([(Intent::Creative, "creative-model".to_string())]),
            ..config()
        });
        assert!(
            strategy
                .apply(&context_for("implement a function to debug this code"))
                .is_none()
        );
    }

    #[test]
    fn test_disabled_without_mappings() {
        let strategy = IntentStrategy::new(IntentRoutingConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(!strategy.enabled());
    }
}
