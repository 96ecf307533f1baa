//! Stream transformer contract

use crate::types::TokenStream;

/// A transformation stage over a live token stream
///
/// Transformers are composed by ascending priority: stage *i*'s output
/// stream is stage *i+1*'s input stream. Implementations must not carry
/// state between streams; anything per-stream is created inside `process`
/// and `reset` is invoked once at the start of every new stream.
pub trait StreamTransformer: Send + Sync {
    /// Wrap the input stream with this transformation
    fn process(&self, stream: TokenStream) -> TokenStream;

    /// Priority of this transformer (lower runs first)
    fn priority(&self) -> i32;

    /// Transformer name for logging
    fn name(&self) -> &str;

    /// Whether this transformer participates in the chain
    fn enabled(&self) -> bool {
        true
    }

    /// Reset any internal state before a new stream
    fn reset(&self) {}
}
