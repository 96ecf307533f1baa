//! A/B experiment routing
//!
//! Assigns requests to experiment variants deterministically (same user,
//! same experiment, same variant) and rewrites the model to the variant's.

use super::context::RoutingContext;
use super::strategy::RoutingStrategy;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One arm of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentVariant {
    pub name: String,
    pub model: String,
    /// Relative traffic weight
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// An A/B experiment over model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    /// When set, the experiment only applies to requests selecting this model
    #[serde(default)]
    pub target_model: Option<String>,
    pub variants: Vec<ExperimentVariant>,
}

impl Experiment {
    /// Whether this experiment applies to the given selection
    fn matches(&self, selected_model: &str) -> bool {
        self.active
            && !self.variants.is_empty()
            && self
                .target_model
                .as_deref()
                .is_none_or(|target| target == selected_model)
    }

    /// Deterministically assign a subject to a variant by weighted bucket
    pub fn assign(&self, subject: &str) -> &ExperimentVariant {
        let total: u32 = self.variants.iter().map(|v| v.weight.max(1)).sum();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.id.hash(&mut hasher);
        subject.hash(&mut hasher);
        let mut bucket = (hasher.finish() % u64::from(total)) as u32;

        for variant in &self.variants {
            let weight = variant.weight.max(1);
            if bucket < weight {
                return variant;
            }
            bucket -= weight;
        }
        // Unreachable with the weighted sum above, but stay total
        &self.variants[self.variants.len() - 1]
    }
}

/// Routes requests into active experiments
pub struct ExperimentStrategy {
    experiments: Vec<Experiment>,
}

impl ExperimentStrategy {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self { experiments }
    }
}

impl RoutingStrategy for ExperimentStrategy {
    fn apply(&self, context: &RoutingContext) -> Option<RoutingContext> {
        let experiment = self
            .experiments
            .iter()
            .find(|e| e.matches(context.selected_model()))?;

        let subject = context.request().user.as_deref().unwrap_or("anonymous");
        let variant = experiment.assign(subject);

        tracing::info!(
            experiment = %experiment.name,
            variant = %variant.name,
            model = %variant.model,
            "experiment routing applied"
        );

        let reason = format!(
            "A/B test: {} variant {}",
            experiment.name, variant.name
        );
        Some(
            context
                .with_model(&variant.model, reason)
                .with_experiment(&experiment.id, &variant.name),
        )
    }

    fn priority(&self) -> i32 {
        20
    }

    fn name(&self) -> &str {
        "experiment-routing"
    }

    fn enabled(&self) -> bool {
        self.experiments.iter().any(|e| e.active)
    }
}
