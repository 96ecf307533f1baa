//! Stream processing chain
//!
//! Ordered transformers applied to a live token stream: sensitive-value
//! restoration first, then content-safety guardrails. Per-stream state is
//! created inside each `process` call, so nothing leaks between streams.

pub mod chain;
pub mod guardrail;
pub mod restore;
pub mod transformer;

pub use chain::StreamTransformerChain;
pub use guardrail::{
    GuardrailConfig, GuardrailState, GuardrailTransformer, PatternAction, PatternSeverity,
    PatternSpec, StreamVerdict, StreamingGuardrail, ToxicityPattern,
};
pub use restore::{PlaceholderResolver, RestorationTransformer, RestoreConfig, TokenVault};
pub use transformer::StreamTransformer;
