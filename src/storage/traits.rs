// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::config::BackendKind;
pub use crate::error::StorageError;

/// A column-keyed result row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Positional statement parameter, bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// Bound as `YYYY-MM-DD` text; compare against a day-truncated column
    Date(NaiveDate),
    Bool(bool),
    Null,
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// How many rows a read should materialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Every row
    #[default]
    All,
    /// At most the first row
    One,
    /// Execute for side effects, return no rows
    None,
}

/// A storage engine the data backend can drive.
///
/// Connection checkout and release belong to the implementation; a
/// connection must go back to the pool on every exit path, including when
/// the returned future is dropped.
#[async_trait]
pub trait SqlEngine: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Configured pool capacity (1 for a single shared connection)
    fn pool_size(&self) -> u32;

    async fn fetch(&self, sql: &str, params: &[SqlValue], mode: FetchMode) -> Result<Vec<Record>, StorageError>;

    /// Execute and commit a write, returning affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StorageError>;

    /// Check out one connection for a multi-statement unit of work.
    async fn begin(&self) -> Result<Box<dyn EngineTransaction>, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;

    async fn close(&self);
}

/// A single connection holding an open transaction.
///
/// Dropping without `commit` rolls back.
#[async_trait]
pub trait EngineTransaction: Send {
    async fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>, StorageError>;
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, StorageError>;
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Shared remote key-value store backing the cache tier.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError>;
    /// Returns the number of keys removed (0 or 1)
    async fn delete(&self, key: &str) -> Result<u64, StorageError>;
    /// Native glob listing; returned keys are unprefixed
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StorageError>;
    async fn ping(&self) -> Result<(), StorageError>;
}
