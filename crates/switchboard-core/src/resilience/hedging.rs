//! Hedged execution over independent calls
//!
//! Two shapes: `race` returns the first success and abandons the losers,
//! `collect` waits for every call and keeps the successes. Calls always run
//! concurrently on detached tasks; losers are never force-cancelled, their
//! results are simply discarded when nobody is listening anymore.

use crate::error::{GatewayError, GatewayResult};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

/// A prepared zero-argument call submitted to the hedging executor
pub type HedgedCall<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Executes groups of independent calls concurrently
#[derive(Debug, Clone, Copy, Default)]
pub struct HedgingExecutor;

impl HedgingExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Return the first successful result
    ///
    /// Callers must make the calls idempotent or tolerate wasted work: once a
    /// winner is decided, later results are discarded. If every call fails,
    /// an aggregate error naming each failure is returned.
    pub async fn race<T>(&self, label: &str, calls: Vec<HedgedCall<T>>) -> GatewayResult<T>
    where
        T: Send + 'static,
    {
        if calls.is_empty() {
            return Err(GatewayError::invalid_input(format!(
                "hedging '{label}' needs at least one call"
            )));
        }

        let total = calls.len();
        let (tx, mut rx) = mpsc::channel(total);
        for (index, call) in calls.into_iter().enumerate() {
            let tx = tx.clone();
            tokio::spawn(async move {
                // Send fails once a winner dropped the receiver; the loser's
                // result is discarded, which is the contract.
                let _ = tx.send((index, call.await)).await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some((index, result)) = rx.recv().await {
            match result {
                Ok(value) => {
                    tracing::debug!(label, winner = index, "hedged race decided");
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(label, call = index, error = %error, "hedged call failed");
                    failures.push(format!("call {index}: {error}"));
                }
            }
        }

        Err(GatewayError::AllCallsFailed {
            label: label.to_string(),
            failures,
        })
    }

    /// Run every call concurrently and return all successes
    ///
    /// Failures are logged and silently dropped. The result is empty when the
    /// input is empty.
    pub async fn collect<T>(&self, label: &str, calls: Vec<HedgedCall<T>>) -> Vec<T>
    where
        T: Send + 'static,
    {
        let handles: Vec<_> = calls.into_iter().map(tokio::spawn).collect();

        let mut successes = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(value)) => successes.push(value),
                Ok(Err(error)) => {
                    tracing::warn!(label, call = index, error = %error, "fan-out call failed");
                }
                Err(join_error) => {
                    tracing::warn!(label, call = index, error = %join_error, "fan-out task panicked");
                }
            }
        }
        successes
    }
}
