//! Core error types for the Switchboard gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Main error type for the Switchboard gateway
///
/// Variants are grouped by where they arise: upstream backend failures,
/// resilience-layer rejections, routing dead ends, and stream policy
/// terminations. `StreamAborted` is a deliberate terminal state, not a
/// transport failure, and callers can distinguish it from network errors.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// An upstream backend returned an error
    #[error("Backend error: {backend}: {message}")]
    Backend { backend: String, message: String },

    /// HTTP-level failure talking to an upstream service
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    /// The circuit breaker for a backend is open; the call was never made
    #[error("Circuit breaker open for backend: {backend}")]
    CircuitOpen { backend: String },

    /// The backend's admitted request rate was exhausted
    #[error("Rate limited for backend: {backend}")]
    RateLimited { backend: String },

    /// Every backend in the fallback chain was tried and failed
    #[error("All backends failed, attempted: {}", .attempted.join(", "))]
    AllBackendsFailed { attempted: Vec<String> },

    /// Every hedged call in a race or fan-out failed
    #[error("All hedged calls failed for '{label}': {}", .failures.join("; "))]
    AllCallsFailed {
        label: String,
        failures: Vec<String>,
    },

    /// No registered backend serves the requested model
    #[error("No backend available for model: {model}")]
    NoBackendAvailable { model: String },

    /// A stream was terminated by content policy
    #[error("Stream aborted ({category}): {reason}")]
    StreamAborted { reason: String, category: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Operation timed out
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Uncategorized error
    #[error("{message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_errors_name_participants() {
        let err = GatewayError::AllBackendsFailed {
            attempted: vec!["openai".to_string(), "anthropic".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("anthropic"));

        let err = GatewayError::AllCallsFailed {
            label: "consensus".to_string(),
            failures: vec!["backend a: timeout".to_string(), "backend b: 503".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("consensus"));
        assert!(msg.contains("timeout"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_stream_abort_is_distinguishable() {
        let err = GatewayError::stream_aborted("policy violation", "JAILBREAK");
        assert!(matches!(err, GatewayError::StreamAborted { .. }));
        assert!(err.to_string().contains("JAILBREAK"));
    }
}
