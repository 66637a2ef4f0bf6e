// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis store backing the remote cache tier.
//!
//! Values are opaque bytes (serialized JSON written by the cache tier) stored
//! as plain strings with `SETEX`. Every command runs under a per-operation
//! timeout so an unresponsive server surfaces as [`StorageError::Timeout`]
//! instead of stalling a report request.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{RemoteCache, StorageError};

pub struct RedisStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "orders:" → "orders:report:sales:…")
    prefix: String,
    op_timeout: Duration,
}

impl RedisStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None, Duration::from_secs(5)).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// The prefix is prepended to all keys, enabling namespacing when
    /// sharing a Redis instance with other applications.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use report_engine::storage::redis::RedisStore;
    /// # use std::time::Duration;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "orders:report:sales:1a2b3c4d5e6f7a8b"
    /// let store = RedisStore::with_prefix("redis://localhost/1", Some("orders:"), Duration::from_secs(5)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
        op_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = Client::open(connection_string).map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StorageError::Timeout(format!("redis connect exceeded {:?}", op_timeout)))??;

        info!(prefix = prefix.unwrap_or(""), "Connected remote cache store");
        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            op_timeout,
        })
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Strip the prefix from a key (for returning clean keys from KEYS).
    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn timed<T, F>(&self, op: &str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StorageError::from),
            Err(_) => Err(StorageError::Timeout(format!("redis {} exceeded {:?}", op, self.op_timeout))),
        }
    }
}

#[async_trait]
impl RemoteCache for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut conn = self.connection.clone();
        let key = self.prefixed_key(key);
        self.timed("GET", async move { conn.get::<_, Option<Vec<u8>>>(&key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let key = self.prefixed_key(key);
        // SETEX rejects 0
        let seconds = ttl.as_secs().max(1);
        self.timed("SETEX", async move { conn.set_ex::<_, _, ()>(&key, value, seconds).await }).await
    }

    async fn delete(&self, key: &str) -> Result<u64, StorageError> {
        let mut conn = self.connection.clone();
        let key = self.prefixed_key(key);
        self.timed("DEL", async move { conn.del::<_, u64>(&key).await }).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = self.connection.clone();
        let pattern = self.prefixed_key(pattern);
        let raw: Vec<String> = self
            .timed("KEYS", async move { cmd("KEYS").arg(&pattern).query_async(&mut conn).await })
            .await?;
        debug!(count = raw.len(), "Listed remote keys");
        Ok(raw.iter().map(|k| self.strip_prefix(k).to_string()).collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: String = self
            .timed("PING", async move { cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}
