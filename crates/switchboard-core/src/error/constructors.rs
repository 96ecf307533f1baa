//! Constructor methods for GatewayError

use super::types::GatewayError;

impl GatewayError {
    /// Create a backend error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
            status: None,
        }
    }

    /// Create an HTTP error with status code
    pub fn http_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Http {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a circuit-open error
    pub fn circuit_open(backend: impl Into<String>) -> Self {
        Self::CircuitOpen {
            backend: backend.into(),
        }
    }

    /// Create a rate-limited error
    pub fn rate_limited(backend: impl Into<String>) -> Self {
        Self::RateLimited {
            backend: backend.into(),
        }
    }

    /// Create a stream-aborted error
    pub fn stream_aborted(reason: impl Into<String>, category: impl Into<String>) -> Self {
        Self::StreamAborted {
            reason: reason.into(),
            category: category.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}
