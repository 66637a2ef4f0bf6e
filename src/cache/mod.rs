// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-tier report cache.
//!
//! The remote tier (Redis) is shared between processes and enforces TTLs.
//! The local tier is an in-process map that every `set` also writes, so
//! reads keep working while the remote tier is down. Cache failures are
//! never returned to callers: they are logged, counted against the cache
//! breaker, and the call degrades to the local tier.
//!
//! # Flow
//!
//! ```text
//! get(key)
//!    │
//!    ├─ disabled ──────────────────────────────► None
//!    │
//!    ├─ remote present + breaker allows
//!    │      ├─ hit ────────────────────────────► Some (hit)
//!    │      ├─ miss ──┐
//!    │      └─ error ─┤ (record_failure)
//!    │                ▼
//!    └─────────► local map
//!                   ├─ present (and fresh) ────► Some (hit)
//!                   └─ absent ─────────────────► None (miss)
//! ```
//!
//! Local entries have no expiry unless `local_cache_ttl_secs` is set, so
//! while the remote tier is down they can outlive the remote TTL.

pub mod key;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use key::derive_key;

use crate::config::ReportEngineConfig;
use crate::metrics;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitConfig};
use crate::storage::redis::RedisStore;
use crate::storage::traits::RemoteCache;

const CIRCUIT_NAME: &str = "cache";

/// Pattern matching every cached report
pub const REPORT_KEY_PATTERN: &str = "report:*";

#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    stored_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    /// Remote tier configured and its breaker closed
    pub using_remote: bool,
    pub circuit: CircuitBreakerState,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    pub local_entries: usize,
}

pub struct CacheTier {
    remote: Option<Arc<dyn RemoteCache>>,
    local: DashMap<String, LocalEntry>,
    breaker: CircuitBreaker,
    enabled: bool,
    default_ttl: Duration,
    local_ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl CacheTier {
    pub fn new(
        remote: Option<Arc<dyn RemoteCache>>,
        enabled: bool,
        circuit: CircuitConfig,
        default_ttl: Duration,
    ) -> Self {
        Self {
            remote,
            local: DashMap::new(),
            breaker: CircuitBreaker::new(CIRCUIT_NAME, circuit),
            enabled,
            default_ttl,
            local_ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Local tier only (no remote store).
    pub fn local_only(enabled: bool, default_ttl: Duration) -> Self {
        Self::new(None, enabled, CircuitConfig::cache(), default_ttl)
    }

    /// Expire local entries after `ttl`. `None` keeps them until deleted.
    #[must_use]
    pub fn with_local_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.local_ttl = ttl;
        self
    }

    /// Build from config, connecting the remote store if one is configured.
    ///
    /// An unreachable remote store at startup leaves the tier local-only.
    pub async fn from_config(config: &ReportEngineConfig) -> Self {
        let remote: Option<Arc<dyn RemoteCache>> = match (&config.redis_url, config.cache_enabled) {
            (Some(url), true) => {
                let prefix = Some(config.redis_prefix.as_str()).filter(|p| !p.is_empty());
                let op_timeout = Duration::from_millis(config.cache_op_timeout_ms);
                match RedisStore::with_prefix(url, prefix, op_timeout).await {
                    Ok(store) => Some(Arc::new(store)),
                    Err(e) => {
                        warn!(error = %e, "Remote cache unreachable, using local tier only");
                        metrics::record_error(CIRCUIT_NAME, "unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        info!(
            enabled = config.cache_enabled,
            remote = remote.is_some(),
            "Cache tier ready"
        );
        Self::new(remote, config.cache_enabled, config.cache_circuit(), config.cache_default_ttl())
            .with_local_ttl(config.local_cache_ttl())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    #[must_use]
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch and deserialize a value, remote tier first.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        if let Some(bytes) = self.remote_get(key).await {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_request("remote", "hit");
                    debug!(key, "Remote cache hit");
                    return Some(value);
                }
                Err(e) => warn!(key, error = %e, "Undecodable remote cache entry ignored"),
            }
        }

        if let Some(value) = self.local_get::<T>(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_request("local", "hit");
            debug!(key, "Local cache hit");
            return Some(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_request("local", "miss");
        debug!(key, "Cache miss");
        None
    }

    async fn remote_get(&self, key: &str) -> Option<Vec<u8>> {
        let remote = self.remote.as_ref()?;
        if !self.breaker.allow_request() {
            debug!(key, "Cache circuit open, skipping remote tier");
            return None;
        }

        match remote.get(key).await {
            Ok(found) => {
                self.breaker.record_success();
                if found.is_none() {
                    metrics::record_cache_request("remote", "miss");
                }
                found
            }
            Err(e) => {
                self.breaker.record_failure();
                metrics::record_cache_request("remote", "error");
                warn!(key, error = %e, "Remote cache read failed, falling back to local tier");
                None
            }
        }
    }

    fn local_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = {
            let entry = self.local.get(key)?;
            if let Some(ttl) = self.local_ttl {
                if entry.stored_at.elapsed() > ttl {
                    drop(entry); // Release read lock before removing
                    self.local.remove(key);
                    metrics::set_local_cache_entries(self.local.len());
                    return None;
                }
            }
            entry.value.clone()
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Undecodable local cache entry dropped");
                self.local.remove(key);
                None
            }
        }
    }

    /// Store a value in both tiers. `ttl = None` uses the default TTL.
    ///
    /// Returns false when the tier is disabled or the value could not be
    /// serialized.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        if !self.enabled {
            return false;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Cache value not serializable, skipping");
                metrics::record_error(CIRCUIT_NAME, "serialize");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);

        if let Some(remote) = &self.remote {
            if self.breaker.allow_request() {
                match remote.set_ex(key, &bytes, ttl).await {
                    Ok(()) => {
                        self.breaker.record_success();
                        metrics::record_cache_set("remote", "success");
                    }
                    Err(e) => {
                        self.breaker.record_failure();
                        metrics::record_cache_set("remote", "error");
                        warn!(key, error = %e, "Remote cache write failed, keeping local copy");
                    }
                }
            }
        }

        self.local.insert(
            key.to_string(),
            LocalEntry {
                value: bytes,
                stored_at: Instant::now(),
            },
        );
        metrics::record_cache_set("local", "success");
        metrics::set_local_cache_entries(self.local.len());
        self.sets.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a key from both tiers; returns how many tiers held it.
    pub async fn delete(&self, key: &str) -> u64 {
        if !self.enabled {
            return 0;
        }

        let mut deleted = 0;
        if let Some(remote) = &self.remote {
            if self.breaker.allow_request() {
                match remote.delete(key).await {
                    Ok(n) => {
                        self.breaker.record_success();
                        deleted += n;
                    }
                    Err(e) => {
                        self.breaker.record_failure();
                        warn!(key, error = %e, "Remote cache delete failed");
                    }
                }
            }
        }

        if self.local.remove(key).is_some() {
            deleted += 1;
        }
        metrics::set_local_cache_entries(self.local.len());
        deleted
    }

    /// Remove every key matching a glob pattern from both tiers.
    ///
    /// The count sums both tiers, so a key present in each counts twice.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        if !self.enabled {
            return 0;
        }

        let mut deleted = 0;
        if let Some(remote) = &self.remote {
            if self.breaker.allow_request() {
                match self.remote_delete_pattern(remote.as_ref(), pattern).await {
                    Ok(n) => {
                        self.breaker.record_success();
                        deleted += n;
                    }
                    Err(e) => {
                        self.breaker.record_failure();
                        warn!(pattern, error = %e, "Remote cache pattern delete failed");
                    }
                }
            }
        }

        match glob::Pattern::new(pattern) {
            Ok(matcher) => {
                let doomed: Vec<String> = self
                    .local
                    .iter()
                    .filter(|entry| matcher.matches(entry.key()))
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in doomed {
                    if self.local.remove(&key).is_some() {
                        deleted += 1;
                    }
                }
            }
            Err(e) => warn!(pattern, error = %e, "Invalid local cache pattern"),
        }

        metrics::set_local_cache_entries(self.local.len());
        info!(pattern, deleted, "Cache entries invalidated");
        deleted
    }

    async fn remote_delete_pattern(
        &self,
        remote: &dyn RemoteCache,
        pattern: &str,
    ) -> Result<u64, crate::error::StorageError> {
        let mut deleted = 0;
        for key in remote.keys(pattern).await? {
            deleted += remote.delete(&key).await?;
        }
        Ok(deleted)
    }

    /// Drop every cached report.
    pub async fn invalidate_reports(&self) -> u64 {
        self.delete_pattern(REPORT_KEY_PATTERN).await
    }

    /// Whether the remote tier answers a ping. False when there is no
    /// remote tier or its breaker is open.
    pub async fn is_connected(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };
        if !self.enabled || !self.breaker.allow_request() {
            return false;
        }
        match remote.ping().await {
            Ok(()) => {
                self.breaker.record_success();
                metrics::set_backend_healthy("redis", true);
                true
            }
            Err(e) => {
                self.breaker.record_failure();
                metrics::set_backend_healthy("redis", false);
                debug!(error = %e, "Remote cache ping failed");
                false
            }
        }
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            enabled: self.enabled,
            using_remote: self.remote.is_some() && !self.breaker.is_open(),
            circuit: self.breaker.snapshot(),
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            local_entries: self.local.len(),
        }
    }

    /// Clear the local tier (shutdown, tests).
    pub fn clear_local(&self) {
        self.local.clear();
        metrics::set_local_cache_entries(0);
    }
}
