//! Chaos Testing for the Report Engine
//!
//! Failure scenarios driven by wrappers that inject errors on demand:
//! 1. **FailingEngine** - a real embedded engine whose calls can be made to fail
//! 2. **FlakyRemote** - an in-memory remote cache store that can go down
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use report_engine::reports::schema;
use report_engine::storage::sql::SqlxEngine;
use report_engine::storage::traits::{EngineTransaction, FetchMode, Record, RemoteCache, SqlEngine, SqlValue, StorageError};
use report_engine::{
    BackendKind, CacheTier, CircuitConfig, CircuitState, DataBackend, ReportData, ReportEngine, ReportEngineConfig,
    ReportError, ReportPeriod, ReportRequest, ReportType,
};

// =============================================================================
// Failing Wrappers - Error Injection
// =============================================================================

/// A real engine whose calls fail while `failing` is set.
struct FailingEngine {
    inner: SqlxEngine,
    failing: AtomicBool,
    calls: AtomicU64,
}

impl FailingEngine {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected: connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SqlEngine for FailingEngine {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn pool_size(&self) -> u32 {
        self.inner.pool_size()
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue], mode: FetchMode) -> Result<Vec<Record>, StorageError> {
        self.check()?;
        self.inner.fetch(sql, params, mode).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StorageError> {
        self.check()?;
        self.inner.execute(sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn EngineTransaction>, StorageError> {
        self.check()?;
        self.inner.begin().await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check()?;
        self.inner.ping().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// In-memory remote store that can be taken down.
#[derive(Default)]
struct FlakyRemote {
    entries: DashMap<String, Vec<u8>>,
    down: AtomicBool,
    calls: AtomicU64,
}

impl FlakyRemote {
    fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Timeout("injected: redis GET exceeded 5s".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteCache for FlakyRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set_ex(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<(), StorageError> {
        self.check()?;
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, StorageError> {
        self.check()?;
        Ok(u64::from(self.entries.remove(key).is_some()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        self.check()?;
        let matcher = glob::Pattern::new(pattern).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(self.entries.iter().map(|e| e.key().clone()).filter(|k| matcher.matches(k)).collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

fn sales_request() -> ReportRequest {
    ReportRequest::builder(ReportType::Sales, ReportPeriod::Week).build().unwrap()
}

/// Seeded embedded engine wrapped for failure injection.
async fn failing_engine(dir: &TempDir) -> Arc<FailingEngine> {
    let config = ReportEngineConfig {
        backend: BackendKind::Sqlite,
        sqlite_path: dir.path().join("chaos.sqlite3").to_string_lossy().into_owned(),
        ..ReportEngineConfig::testing()
    };
    let engine = Arc::new(FailingEngine {
        inner: SqlxEngine::connect_sqlite(&config).await.unwrap(),
        failing: AtomicBool::new(false),
        calls: AtomicU64::new(0),
    });

    let seeding = DataBackend::with_engine(engine.clone(), CircuitConfig::default(), Duration::from_secs(1));
    schema::install(&seeding).await.unwrap();
    seeding
        .execute_update("INSERT INTO customers (id, username) VALUES (1, 'jdoe')", &[], true)
        .await
        .unwrap();
    seeding
        .execute_update(
            "INSERT INTO orders (id, customer_id, order_date, status, total) VALUES \
             (1, 1, '2024-06-14 10:00:00', 'COMPLETED', 100)",
            &[],
            true,
        )
        .await
        .unwrap();
    engine
}

fn report_engine(engine: Arc<FailingEngine>, db_circuit: CircuitConfig, cache: CacheTier) -> ReportEngine {
    let backend = DataBackend::with_engine(engine, db_circuit, Duration::from_secs(1));
    ReportEngine::new(Arc::new(backend), Arc::new(cache), Duration::from_secs(600))
}

// =============================================================================
// Database Chaos
// =============================================================================

#[tokio::test]
async fn chaos_database_breaker_opens_after_threshold() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let circuit = CircuitConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(60) };
    let engine = report_engine(sql.clone(), circuit, CacheTier::local_only(false, Duration::from_secs(60)));

    sql.set_failing(true);
    for _ in 0..3 {
        let err = engine.generate_as_of(&sales_request(), today()).await.unwrap_err();
        assert!(matches!(err, ReportError::Query { .. }), "{err:?}");
        assert_eq!(err.public_message(), "report generation failed");
    }
    assert_eq!(engine.backend().circuit().state(), CircuitState::Open);

    // Fourth call is rejected without reaching the engine
    let calls = sql.calls();
    let err = engine.generate_as_of(&sales_request(), today()).await.unwrap_err();
    assert_eq!(err, ReportError::CircuitOpen { resource: "database".into() });
    assert!(err.is_retryable());
    assert_eq!(sql.calls(), calls);

    let stats = engine.backend().stats();
    assert_eq!(stats.error_count, 3);
    assert!(stats.circuit.open);
}

#[tokio::test]
async fn chaos_database_recovers_through_probe() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let circuit = CircuitConfig { failure_threshold: 2, recovery_timeout: Duration::from_millis(100) };
    let engine = report_engine(sql.clone(), circuit, CacheTier::local_only(false, Duration::from_secs(60)));

    sql.set_failing(true);
    for _ in 0..2 {
        assert!(engine.generate_as_of(&sales_request(), today()).await.is_err());
    }
    assert!(engine.backend().circuit().is_open());

    // A failed probe reopens the circuit
    tokio::time::sleep(Duration::from_millis(150)).await;
    let err = engine.generate_as_of(&sales_request(), today()).await.unwrap_err();
    assert!(matches!(err, ReportError::Query { .. }));
    let err = engine.generate_as_of(&sales_request(), today()).await.unwrap_err();
    assert!(matches!(err, ReportError::CircuitOpen { .. }));

    // Engine back; the next probe closes it
    sql.set_failing(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let envelope = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(!envelope.cached);
    assert_eq!(engine.backend().circuit().state(), CircuitState::Closed);
}

#[tokio::test]
async fn chaos_summary_after_cooldown_closes_breaker() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let circuit = CircuitConfig { failure_threshold: 1, recovery_timeout: Duration::from_millis(100) };
    let engine = report_engine(sql.clone(), circuit, CacheTier::local_only(false, Duration::from_secs(60)));
    let summary = ReportRequest::builder(ReportType::Summary, ReportPeriod::Day).build().unwrap();

    sql.set_failing(true);
    assert!(engine.generate_as_of(&summary, today()).await.is_err());
    assert_eq!(engine.backend().circuit().state(), CircuitState::Open);

    // Summary runs several statements; the first is the probe and must close
    // the breaker before the rest are admitted
    sql.set_failing(false);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let envelope = engine.generate_as_of(&summary, today()).await.unwrap();
    assert_eq!(engine.backend().circuit().state(), CircuitState::Closed);

    match envelope.data {
        ReportData::Summary(metrics) => {
            assert_eq!(metrics.today_orders, 0);
            assert_eq!(metrics.yesterday_revenue, 100.0);
        }
        other => panic!("expected summary, got {other:?}"),
    }

    // And stays closed for the next caller
    engine.generate_as_of(&summary, today()).await.unwrap();
    assert_eq!(engine.backend().circuit().state(), CircuitState::Closed);
}

#[tokio::test]
async fn chaos_concurrent_requests_during_outage() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let circuit = CircuitConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(60) };
    let engine = Arc::new(report_engine(sql.clone(), circuit, CacheTier::local_only(false, Duration::from_secs(60))));

    sql.set_failing(true);
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.generate_as_of(&sales_request(), today()).await })
        })
        .collect();

    let mut query_errors = 0u64;
    for handle in handles {
        match handle.await.unwrap() {
            Err(ReportError::Query { .. }) => query_errors += 1,
            Err(ReportError::CircuitOpen { .. }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert!(query_errors >= 3);
    assert_eq!(engine.backend().stats().error_count, query_errors);
    assert!(engine.backend().circuit().is_open());
}

// =============================================================================
// Cache Chaos
// =============================================================================

#[tokio::test]
async fn chaos_remote_cache_down_reports_still_generate() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let remote = Arc::new(FlakyRemote::default());
    remote.down.store(true, Ordering::SeqCst);

    let cache_circuit = CircuitConfig { failure_threshold: 3, recovery_timeout: Duration::from_secs(60) };
    let cache = CacheTier::new(Some(remote.clone() as Arc<dyn RemoteCache>), true, cache_circuit, Duration::from_secs(60));
    let engine = report_engine(sql, CircuitConfig::default(), cache);

    // get fails, set fails, report still computed and kept locally
    let first = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(!first.cached);

    // Third remote failure opens the cache circuit; local tier answers
    let second = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(second.cached);
    assert_eq!(engine.cache().circuit().state(), CircuitState::Open);

    let third = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(third.cached);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
    assert!(!engine.cache().is_connected().await);
    assert!(!engine.cache().stats().using_remote);
}

#[tokio::test]
async fn chaos_remote_cache_outage_does_not_touch_database_breaker() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let remote = Arc::new(FlakyRemote::default());
    let cache = CacheTier::new(Some(remote.clone() as Arc<dyn RemoteCache>), true, CircuitConfig::default(), Duration::from_secs(60));
    let engine = report_engine(sql, CircuitConfig::default(), cache);

    engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert_eq!(remote.entries.len(), 1);

    remote.down.store(true, Ordering::SeqCst);
    let envelope = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(envelope.cached);
    assert_eq!(engine.backend().circuit().state(), CircuitState::Closed);
    assert_eq!(engine.backend().stats().error_count, 0);
}

#[tokio::test]
async fn chaos_corrupted_remote_entry_is_recomputed() {
    let dir = TempDir::new().unwrap();
    let sql = failing_engine(&dir).await;
    let remote = Arc::new(FlakyRemote::default());
    let cache = CacheTier::new(Some(remote.clone() as Arc<dyn RemoteCache>), true, CircuitConfig::default(), Duration::from_secs(60));
    let engine = report_engine(sql, CircuitConfig::default(), cache);

    engine.generate_as_of(&sales_request(), today()).await.unwrap();
    let key = remote.entries.iter().next().map(|e| e.key().clone()).unwrap();
    remote.entries.insert(key, b"{\"report_type\": \"sa".to_vec());
    engine.cache().clear_local();

    let envelope = engine.generate_as_of(&sales_request(), today()).await.unwrap();
    assert!(!envelope.cached);
}
