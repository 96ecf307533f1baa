//! Per-backend health signals
//!
//! Latency and outcome samples recorded by the resilient executor, read by
//! the adaptive limiter and by health-aware routing strategies.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Health state for a single backend
pub struct BackendHealth {
    window: Duration,
    latencies: Mutex<VecDeque<(Instant, Duration)>>,
    outcomes: Mutex<VecDeque<(Instant, bool)>>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
}

impl BackendHealth {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latencies: Mutex::new(VecDeque::new()),
            outcomes: Mutex::new(VecDeque::new()),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Record one completed call
    ///
    /// Latency is sampled for successful calls; failures only move the error
    /// ratio so a fast-failing backend does not look fast.
    pub fn record(&self, latency: Option<Duration>, ok: bool) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
        }

        let now = Instant::now();
        if let Some(latency) = latency {
            let mut latencies = self.latencies.lock();
            latencies.push_back((now, latency));
            Self::prune(&mut latencies, self.window);
        }
        let mut outcomes = self.outcomes.lock();
        outcomes.push_back((now, ok));
        Self::prune(&mut outcomes, self.window);
    }

    /// Mean latency over the recent window, if any samples exist
    pub fn mean_latency(&self) -> Option<Duration> {
        let mut latencies = self.latencies.lock();
        Self::prune(&mut latencies, self.window);
        if latencies.is_empty() {
            return None;
        }
        let total: Duration = latencies.iter().map(|(_, d)| *d).sum();
        Some(total / latencies.len() as u32)
    }

    /// Error ratio over the recent window (0.0 when no samples)
    pub fn error_ratio(&self) -> f64 {
        let mut outcomes = self.outcomes.lock();
        Self::prune(&mut outcomes, self.window);
        if outcomes.is_empty() {
            return 0.0;
        }
        let failures = outcomes.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / outcomes.len() as f64
    }

    /// Completed calls in the recent window
    pub fn sample_count(&self) -> u32 {
        let mut outcomes = self.outcomes.lock();
        Self::prune(&mut outcomes, self.window);
        outcomes.len() as u32
    }

    /// Total calls recorded over the backend's lifetime
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn prune<T>(samples: &mut VecDeque<(Instant, T)>, window: Duration) {
        while let Some((at, _)) = samples.front() {
            if at.elapsed() > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Point-in-time view of a backend's health
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub mean_latency: Option<Duration>,
    pub error_ratio: f64,
    pub samples: u32,
}

/// Health signals for all backends, created on first use
pub struct HealthRegistry {
    window: Duration,
    backends: DashMap<String, Arc<BackendHealth>>,
}

impl HealthRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            backends: DashMap::new(),
        }
    }

    /// Get or create the health signal for a backend
    pub fn get(&self, name: &str) -> Arc<BackendHealth> {
        self.backends
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(BackendHealth::new(self.window)))
            .clone()
    }

    /// Snapshot a backend's health
    pub fn snapshot(&self, name: &str) -> HealthSnapshot {
        let health = self.get(name);
        HealthSnapshot {
            mean_latency: health.mean_latency(),
            error_ratio: health.error_ratio(),
            samples: health.sample_count(),
        }
    }

    /// Names of all backends with recorded signals
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
