//! Backend contract
//!
//! Every upstream model provider is reached through the [`Backend`] trait.
//! The gateway core never talks to a concrete client directly; providers are
//! registered as `Arc<dyn Backend>` at startup.

use crate::error::GatewayResult;
use crate::types::{ChatRequest, ChatResponse, TokenStream};
use async_trait::async_trait;

/// Unified contract for all upstream LLM backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name (e.g. "openai", "anthropic")
    fn name(&self) -> &str;

    /// Whether the backend is currently available and healthy
    fn is_available(&self) -> bool;

    /// Models this backend serves
    fn supported_models(&self) -> Vec<String>;

    /// Whether this backend serves the requested model
    fn supports_model(&self, model: &str) -> bool {
        self.supported_models().iter().any(|m| m == model)
    }

    /// Closest model this backend offers for a foreign model id
    ///
    /// Used by the fallback chain: when "gpt-4" cannot be served, another
    /// backend maps it onto its own nearest equivalent.
    fn equivalent_model(&self, requested: &str) -> String;

    /// Execute a chat completion
    async fn call(&self, request: &ChatRequest) -> GatewayResult<ChatResponse>;

    /// Execute a streaming chat completion
    ///
    /// The returned stream is lazy and cancellable by dropping it.
    async fn call_stream(&self, request: &ChatRequest) -> GatewayResult<TokenStream>;
}
