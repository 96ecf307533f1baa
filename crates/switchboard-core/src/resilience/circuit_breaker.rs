//! Circuit breaker keyed by backend name
//!
//! Admission control based on the recent failure ratio. A breaker opens once
//! the ratio of failed calls in the sliding window crosses the configured
//! threshold over a minimum sample size, rejects everything until the open
//! wait elapses, then admits a bounded number of trial calls before deciding
//! to close again.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls proceed normally; failures are counted
    Closed,
    /// Calls are rejected without reaching the backend
    Open,
    /// A bounded number of trial calls probe for recovery
    HalfOpen,
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure ratio (0.0 - 1.0) that opens the circuit
    pub failure_rate_threshold: f64,
    /// Minimum completed calls in the window before the ratio is evaluated
    pub min_samples: u32,
    /// Sliding window over which outcomes are counted
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// How long an open circuit rejects before probing
    #[serde(with = "humantime_serde")]
    pub open_wait: Duration,
    /// Trial calls admitted while half-open
    pub half_open_max_calls: u32,
    /// Trial successes required to close again
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            min_samples: 10,
            window: Duration::from_secs(60),
            open_wait: Duration::from_secs(30),
            half_open_max_calls: 3,
            half_open_success_threshold: 2,
        }
    }
}

/// Circuit breaker for a single backend
///
/// All state transitions happen under one lock per breaker, so concurrent
/// completions from the same backend cannot race OPEN/HALF_OPEN decisions.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: RwLock<CircuitState>,
    outcomes: Mutex<VecDeque<(Instant, bool)>>,
    opened_at: RwLock<Option<Instant>>,
    half_open_admitted: AtomicU32,
    half_open_successes: AtomicU32,
}

impl CircuitBreaker {
    /// Create a breaker with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, BreakerConfig::default())
    }

    /// Create a breaker with custom config
    pub fn with_config(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            outcomes: Mutex::new(VecDeque::new()),
            opened_at: RwLock::new(None),
            half_open_admitted: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
        }
    }

    /// Backend name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, transitioning OPEN to HALF_OPEN once the wait elapsed
    pub fn state(&self) -> CircuitState {
        let state = *self.state.read();
        if state == CircuitState::Open {
            let opened_at = *self.opened_at.read();
            if let Some(opened_at) = opened_at {
                if opened_at.elapsed() >= self.config.open_wait {
                    self.transition_to_half_open();
                    return CircuitState::HalfOpen;
                }
            }
        }
        state
    }

    /// Try to acquire admission for one call
    ///
    /// Returns false when the circuit is open or the half-open trial budget
    /// is exhausted; the underlying call must not run in that case.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let admitted = self.half_open_admitted.fetch_add(1, Ordering::AcqRel);
                if admitted >= self.config.half_open_max_calls {
                    self.half_open_admitted.fetch_sub(1, Ordering::Release);
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Record a successful call outcome
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.push_outcome(true);
            }
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.half_open_success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call outcome
    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.push_outcome(false);
                let (samples, failures) = self.window_counts();
                if samples >= self.config.min_samples
                    && failures as f64 / samples as f64 >= self.config.failure_rate_threshold
                {
                    self.transition_to_open();
                }
            }
            // Any trial failure re-opens immediately
            CircuitState::HalfOpen => {
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    /// Failure ratio over the current window (0.0 when no samples)
    pub fn failure_ratio(&self) -> f64 {
        let (samples, failures) = self.window_counts();
        if samples == 0 {
            0.0
        } else {
            failures as f64 / samples as f64
        }
    }

    /// Manually reset the breaker to closed
    pub fn reset(&self) {
        self.transition_to_closed();
    }

    fn push_outcome(&self, ok: bool) {
        let mut outcomes = self.outcomes.lock();
        outcomes.push_back((Instant::now(), ok));
        Self::prune(&mut outcomes, self.config.window);
    }

    fn window_counts(&self) -> (u32, u32) {
        let mut outcomes = self.outcomes.lock();
        Self::prune(&mut outcomes, self.config.window);
        let samples = outcomes.len() as u32;
        let failures = outcomes.iter().filter(|(_, ok)| !ok).count() as u32;
        (samples, failures)
    }

    fn prune(outcomes: &mut VecDeque<(Instant, bool)>, window: Duration) {
        while let Some((at, _)) = outcomes.front() {
            if at.elapsed() > window {
                outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition_to_open(&self) {
        let mut state = self.state.write();
        *state = CircuitState::Open;
        *self.opened_at.write() = Some(Instant::now());
        self.half_open_admitted.store(0, Ordering::Relaxed);
        self.half_open_successes.store(0, Ordering::Relaxed);

        tracing::warn!(
            circuit = %self.name,
            failure_ratio = self.failure_ratio(),
            "circuit breaker opened"
        );
    }

    fn transition_to_half_open(&self) {
        let mut state = self.state.write();
        // Another completion may have raced us here
        if *state != CircuitState::Open {
            return;
        }
        *state = CircuitState::HalfOpen;
        self.half_open_admitted.store(0, Ordering::Relaxed);
        self.half_open_successes.store(0, Ordering::Relaxed);

        tracing::info!(circuit = %self.name, "circuit breaker half-open, probing");
    }

    fn transition_to_closed(&self) {
        let mut state = self.state.write();
        *state = CircuitState::Closed;
        *self.opened_at.write() = None;
        self.outcomes.lock().clear();
        self.half_open_admitted.store(0, Ordering::Relaxed);
        self.half_open_successes.store(0, Ordering::Relaxed);

        tracing::info!(circuit = %self.name, "circuit breaker closed");
    }
}

/// Per-backend circuit breakers, created on first use
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Get or create the breaker for a backend
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_config(
                    name,
                    self.default_config.clone(),
                ))
            })
            .clone()
    }

    /// Names of all known breakers
    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
