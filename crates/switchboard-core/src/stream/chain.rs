//! Stream transformer chain

use super::transformer::StreamTransformer;
use crate::types::TokenStream;
use std::sync::Arc;

/// Ordered chain of stream transformers
///
/// Built once at startup from an explicit registration list, sorted by
/// priority. Applying the chain resets each enabled transformer and wires
/// its output stream into the next transformer's input.
pub struct StreamTransformerChain {
    transformers: Vec<Arc<dyn StreamTransformer>>,
}

impl StreamTransformerChain {
    /// Build a chain, sorting the transformers by ascending priority
    pub fn new(mut transformers: Vec<Arc<dyn StreamTransformer>>) -> Self {
        transformers.sort_by_key(|t| t.priority());

        tracing::info!(
            count = transformers.len(),
            transformers = ?transformers.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            "initialized stream transformer chain"
        );

        Self { transformers }
    }

    /// A chain that passes streams through untouched
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Apply every enabled transformer to the stream
    pub fn process(&self, stream: TokenStream) -> TokenStream {
        let mut current = stream;

        for transformer in &self.transformers {
            if !transformer.enabled() {
                tracing::trace!(transformer = transformer.name(), "skipping disabled transformer");
                continue;
            }
            transformer.reset();
            current = transformer.process(current);
            tracing::trace!(transformer = transformer.name(), "applied stream transformer");
        }

        current
    }

    /// Registered transformers, in application order
    pub fn transformers(&self) -> &[Arc<dyn StreamTransformer>] {
        &self.transformers
    }
}
