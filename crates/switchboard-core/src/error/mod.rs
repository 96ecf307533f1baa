//! Error types for the Switchboard gateway

mod constructors;
mod types;

pub use types::{GatewayError, GatewayResult};
