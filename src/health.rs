// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Liveness summary for the service's health endpoint.
//!
//! | database | remote cache            | status      |
//! |----------|-------------------------|-------------|
//! | up       | up, or caching disabled | `healthy`   |
//! | up       | down or not configured  | `degraded`  |
//! | down     | any                     | `unhealthy` |

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::cache::CacheTier;
use crate::config::BackendKind;
use crate::resilience::circuit_breaker::CircuitState;
use crate::storage::backend::DataBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub backend_type: BackendKind,
    /// Embedded engine in use because the pooled one was unreachable at startup
    pub fell_back: bool,
    pub circuit: CircuitState,
    pub latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub connected: bool,
    pub circuit: CircuitState,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub database: DatabaseHealth,
    /// Absent when caching is disabled
    pub cache: Option<CacheHealth>,
    pub uptime_seconds: f64,
}

pub struct HealthMonitor {
    backend: Arc<DataBackend>,
    cache: Arc<CacheTier>,
    started: Instant,
}

impl HealthMonitor {
    pub fn new(backend: Arc<DataBackend>, cache: Arc<CacheTier>) -> Self {
        Self { backend, cache, started: Instant::now() }
    }

    /// Probe both resources concurrently.
    pub async fn check(&self) -> HealthReport {
        let (latency, cache_connected) = tokio::join!(self.backend.ping_latency(), self.cache.is_connected());

        let database = DatabaseHealth {
            connected: latency.is_some(),
            backend_type: self.backend.backend_kind(),
            fell_back: self.backend.fell_back(),
            circuit: self.backend.circuit().state(),
            latency_ms: latency.map(|d| d.as_secs_f64() * 1000.0),
        };

        let cache = self.cache.is_enabled().then(|| CacheHealth {
            connected: cache_connected,
            circuit: self.cache.circuit().state(),
            hit_rate: self.cache.stats().hit_rate,
        });

        let status = match (&database, &cache) {
            (db, _) if !db.connected => HealthStatus::Unhealthy,
            (_, Some(c)) if !c.connected => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };
        debug!(?status, database = database.connected, cache = cache_connected, "Health check");

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
            cache,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}
