//! Switchboard gateway core library
//!
//! This crate provides the core of the Switchboard LLM gateway: the routing
//! decision pipeline, the resilient execution layer guarding backend calls,
//! and the streaming transformation chain that restores redacted values and
//! enforces content policy on live token streams.

pub mod backend;
pub mod config;
pub mod error;
pub mod resilience;
pub mod router;
pub mod routing;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use backend::Backend;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use resilience::{
    AdaptiveLimiter, CircuitBreaker, CircuitState, HedgingExecutor, ResilientExecutor,
};
pub use router::MultiBackendRouter;
pub use routing::{RoutingContext, RoutingStrategy, RoutingStrategyChain};
pub use stream::{StreamTransformer, StreamTransformerChain};
pub use types::{ChatMessage, ChatRequest, ChatResponse, StreamChunk, TokenStream, TokenUsage};
