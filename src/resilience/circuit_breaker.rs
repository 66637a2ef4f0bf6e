// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Consecutive-failure circuit breaker.
//!
//! Protects the data backend and the remote cache tier from being hammered
//! while unhealthy. There is no background timer: the Open → HalfOpen
//! transition is evaluated lazily inside [`CircuitBreaker::allow_request`].
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Resource unhealthy, requests fail-fast without attempting
//! - HalfOpen: One probe admitted after the recovery timeout, others rejected
//!
//! A success while closed decrements the failure count (saturating at zero),
//! so isolated blips between successes never trip the breaker.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state for metrics/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Error type for circuit-protected operations
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open)
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Number of consecutive failures to trip the circuit
    pub failure_threshold: u32,
    /// How long after the last failure before a probe is admitted
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitConfig {
    /// Data backend breaker: five consecutive failures, one minute cool-down.
    #[must_use]
    pub fn database() -> Self {
        Self::default()
    }

    /// Cache breaker: trips after three failures so a dead Redis is
    /// abandoned quickly.
    #[must_use]
    pub fn cache() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    /// Fast recovery for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// Point-in-time view of a breaker, exposed through backend/cache stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerState {
    pub name: String,
    pub state: CircuitState,
    /// True only while Open. A half-open breaker is tentatively closed:
    /// its probe is in flight and `failure_count` has been reset.
    pub open: bool,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub timeout_seconds: f64,
    pub calls: u64,
    pub rejections: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    probe_started: Option<Instant>,
}

/// A named circuit breaker with metrics tracking
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,

    // Metrics
    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let name = name.into();
        crate::metrics::set_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_wall: None,
                probe_started: None,
            }),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Get current circuit state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Open and rejecting; false while closed or half-open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Single gate for every protected call.
    ///
    /// Returns true while closed. While open, returns false until the
    /// recovery timeout has elapsed since the last failure, then admits
    /// exactly one probe (HalfOpen) and resets the failure count.
    pub fn allow_request(&self) -> bool {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let allowed = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
                if elapsed > self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.failure_count = 0;
                    inner.probe_started = Some(now);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A probe that never reported back must not wedge the breaker
                let stale = match inner.probe_started {
                    Some(at) => now.saturating_duration_since(at) > self.config.recovery_timeout,
                    None => true,
                };
                if stale {
                    debug!(circuit = %self.name, "Outstanding probe went stale, admitting a new one");
                    inner.probe_started = Some(now);
                }
                stale
            }
        };

        drop(inner);
        if !allowed {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_circuit_breaker_call(&self.name, "rejected");
        }
        allowed
    }

    /// Record a successful protected operation.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_circuit_breaker_call(&self.name, "success");

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.failure_count = 0;
                inner.probe_started = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_sub(1);
            }
            // Late success from a call admitted before the breaker tripped
            CircuitState::Open => {}
        }
    }

    /// Record a failed protected operation.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_circuit_breaker_call(&self.name, "failure");

        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_wall = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.probe_started = None;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => warn!(
                circuit = %self.name,
                from = %from,
                failures = inner.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(circuit = %self.name, "Circuit breaker admitting recovery probe"),
            CircuitState::Closed => info!(circuit = %self.name, from = %from, "Circuit breaker closed"),
        }
        crate::metrics::set_circuit_state(&self.name, to);
    }

    /// Execute an async operation through the circuit breaker
    ///
    /// Takes a closure that returns a Future, allowing lazy evaluation
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
            return Err(CircuitError::Rejected);
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                debug!(circuit = %self.name, "Circuit call failed");
                self.record_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Snapshot of the breaker for stats endpoints
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        CircuitBreakerState {
            name: self.name.clone(),
            state: inner.state,
            open: inner.state == CircuitState::Open,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_time: inner.last_failure_wall,
            timeout_seconds: self.config.recovery_timeout.as_secs_f64(),
            calls: self.calls_total.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    /// Get total number of gate checks
    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    /// Get number of successful calls
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Get number of failed calls (operation errors)
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get number of rejected calls (circuit open)
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}
