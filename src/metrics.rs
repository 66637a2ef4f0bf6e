// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the report engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `report_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: mysql, sqlite
//! - `tier`: remote, local
//! - `status`: success, error, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::resilience::circuit_breaker::CircuitState;

// ═══════════════════════════════════════════════════════════════════════════
// DATA BACKEND - Query execution
// ═══════════════════════════════════════════════════════════════════════════

/// Record a statement executed against a storage engine
pub fn record_query(backend: &str, operation: &str, status: &str) {
    counter!(
        "report_engine_queries_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record statement latency
pub fn record_query_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "report_engine_query_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a statement that exceeded the slow-query threshold
pub fn record_slow_query(backend: &str) {
    counter!(
        "report_engine_slow_queries_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Record the one-time startup fallback to the embedded engine
pub fn record_backend_fallback(from: &str, to: &str) {
    counter!(
        "report_engine_backend_fallbacks_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE TIER - Hits, misses, writes
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup outcome (`hit`, `miss`, `error`)
pub fn record_cache_request(tier: &str, result: &str) {
    counter!(
        "report_engine_cache_requests_total",
        "tier" => tier.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a cache write
pub fn record_cache_set(tier: &str, status: &str) {
    counter!(
        "report_engine_cache_sets_total",
        "tier" => tier.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set current local tier entry count
pub fn set_local_cache_entries(count: usize) {
    gauge!("report_engine_local_cache_entries").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// REPORTS - Generation outcomes
// ═══════════════════════════════════════════════════════════════════════════

/// Record a generated report (`source` is `cache` or `query`)
pub fn record_report(report_type: &str, source: &str) {
    counter!(
        "report_engine_reports_total",
        "report_type" => report_type.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record report generation latency
pub fn record_report_latency(report_type: &str, duration: Duration) {
    histogram!(
        "report_engine_report_seconds",
        "report_type" => report_type.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(component: &str, kind: &str) {
    counter!(
        "report_engine_errors_total",
        "component" => component.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKEND HEALTH - Connection status
// ═══════════════════════════════════════════════════════════════════════════

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "report_engine_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

// ═══════════════════════════════════════════════════════════════════════════
// CIRCUIT BREAKER - Resilience metrics
// ═══════════════════════════════════════════════════════════════════════════

/// Record circuit breaker state change (0 = closed, 1 = half-open, 2 = open)
pub fn set_circuit_state(circuit: &str, state: CircuitState) {
    gauge!(
        "report_engine_circuit_breaker_state",
        "circuit" => circuit.to_string()
    )
    .set(state as u8 as f64);
}

/// Record circuit breaker call outcome
pub fn record_circuit_breaker_call(circuit: &str, outcome: &str) {
    counter!(
        "report_engine_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// A timing guard that records query latency on drop
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_query_latency(self.backend, self.operation, self.start.elapsed());
    }
}
