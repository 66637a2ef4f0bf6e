// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! sqlx-backed storage engine for both the pooled (MySQL) and embedded
//! (SQLite) backends.
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver only decodes integers, doubles, text, blobs and bools:
//! 1. DECIMAL aggregates must be cast in SQL (see [`BackendKind::as_real`])
//! 2. MySQL TEXT columns may arrive as BLOB, so text is read as `String`
//!    first and then as `Vec<u8>`
//!
//! Embedded databases are opened with `mode=rwc`, so a missing file is
//! created. `:memory:` keeps one long-lived connection; every fresh
//! connection would otherwise see its own empty database.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row, ValueRef};
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::{EngineTransaction, FetchMode, Record, SqlEngine, SqlValue, StorageError};
use crate::config::{BackendKind, ReportEngineConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const IN_MEMORY: &str = ":memory:";

/// Connection URL for an embedded database path.
#[must_use]
pub fn sqlite_url(path: &str) -> String {
    if path == IN_MEMORY {
        "sqlite::memory:".to_string()
    } else if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", path)
    }
}

pub struct SqlxEngine {
    pool: AnyPool,
    kind: BackendKind,
    pool_size: u32,
}

impl SqlxEngine {
    /// Open the pooled engine. Fails if no connection can be established
    /// within `connect_timeout_ms`.
    pub async fn connect_mysql(config: &ReportEngineConfig) -> Result<Self, StorageError> {
        install_drivers();

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let connecting = AnyPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .idle_timeout(Duration::from_secs(300))
            .connect(&config.mysql_url);

        let pool = tokio::time::timeout(connect_timeout, connecting)
            .await
            .map_err(|_| StorageError::Timeout(format!("mysql connect exceeded {:?}", connect_timeout)))??;

        info!(pool_size = config.pool_size, "Connected pooled storage engine");
        Ok(Self {
            pool,
            kind: BackendKind::Mysql,
            pool_size: config.pool_size,
        })
    }

    /// Open the embedded engine.
    pub async fn connect_sqlite(config: &ReportEngineConfig) -> Result<Self, StorageError> {
        install_drivers();

        let path = config.sqlite_path.as_str();
        let in_memory = path == IN_MEMORY;
        if !in_memory && !path.starts_with("sqlite:") && !Path::new(path).exists() {
            warn!(path, "Embedded database file not found, creating an empty one");
        }

        let acquire_timeout = Duration::from_millis(config.acquire_timeout_ms);
        let (options, pool_size) = if in_memory {
            let options = AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(acquire_timeout);
            (options, 1)
        } else {
            let options = AnyPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(acquire_timeout);
            (options, config.pool_size)
        };

        let pool = options.connect(&sqlite_url(path)).await?;
        let engine = Self {
            pool,
            kind: BackendKind::Sqlite,
            pool_size,
        };

        if !in_memory {
            engine.enable_wal_mode().await?;
        }

        info!(path, pool_size, "Opened embedded storage engine");
        Ok(engine)
    }

    /// Enable WAL mode so concurrent report reads don't block writers.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        Ok(())
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn decode_value(row: &AnyRow, idx: usize) -> Result<Value, StorageError> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(Value::String(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Ok(Value::String(String::from_utf8_lossy(&v).into_owned()));
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Ok(Value::Bool(v));
    }
    let name = row.columns().get(idx).map_or("?", |c| c.name());
    Err(StorageError::Backend(format!("column '{}' has a type the Any driver cannot decode", name)))
}

fn row_to_record(row: &AnyRow) -> Result<Record, StorageError> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), decode_value(row, idx)?);
    }
    Ok(record)
}

#[async_trait]
impl SqlEngine for SqlxEngine {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn pool_size(&self) -> u32 {
        self.pool_size
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue], mode: FetchMode) -> Result<Vec<Record>, StorageError> {
        let query = bind_params(sql, params);
        match mode {
            FetchMode::All => {
                let rows = query.fetch_all(&self.pool).await?;
                rows.iter().map(row_to_record).collect()
            }
            FetchMode::One => {
                let row = query.fetch_optional(&self.pool).await?;
                row.as_ref().map(row_to_record).transpose().map(|r| r.into_iter().collect())
            }
            FetchMode::None => {
                query.execute(&self.pool).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StorageError> {
        let result = bind_params(sql, params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn EngineTransaction>, StorageError> {
        let tx = self.pool.begin().await?;
        debug!(backend = %self.kind, "Transaction started");
        Ok(Box::new(SqlxTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query(self.kind.ping_statement()).execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!(backend = %self.kind, "Storage engine closed");
    }
}

struct SqlxTransaction {
    tx: sqlx::Transaction<'static, Any>,
}

#[async_trait]
impl EngineTransaction for SqlxTransaction {
    async fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>, StorageError> {
        let rows = bind_params(sql, params).fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, StorageError> {
        let result = bind_params(sql, params).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
