// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the report engine.
//!
//! Two layers:
//! - [`StorageError`]: what a storage engine or remote cache store reports.
//! - [`ReportError`]: what callers of [`crate::DataBackend`] and
//!   [`crate::ReportEngine`] see. Cache failures never surface here; the
//!   cache tier absorbs them.

use thiserror::Error;

/// Failure reported by a storage engine or the remote cache store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Engine unreachable (connect refused, I/O failure, pool closed)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// Pool checkout or command exceeded its time budget
    #[error("storage timeout: {0}")]
    Timeout(String),
    /// Statement or command rejected by the engine
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StorageError::Timeout("connection pool checkout timed out".into()),
            sqlx::Error::PoolClosed => StorageError::Unavailable("connection pool closed".into()),
            sqlx::Error::Io(e) => StorageError::Unavailable(e.to_string()),
            sqlx::Error::Tls(e) => StorageError::Unavailable(e.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

/// Errors surfaced by the data backend and the report engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    /// Malformed or contradictory request (caller's fault)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Resource rejected the call because its breaker is open
    #[error("circuit breaker open for {resource}, request rejected")]
    CircuitOpen { resource: String },

    /// Execution failure against an available backend
    #[error("query failed: {message}")]
    Query { statement: String, message: String },

    /// Report type not known to the engine
    #[error("unsupported report type: {0}")]
    UnsupportedReportType(String),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Neither storage engine could be initialised
    #[error("no storage backend available: {0}")]
    Unavailable(String),
}

impl ReportError {
    pub(crate) fn query(statement: &str, err: impl std::fmt::Display) -> Self {
        ReportError::Query {
            statement: truncate_statement(statement),
            message: err.to_string(),
        }
    }

    /// Message safe to show to an end user. Internal detail stays in logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::UnsupportedReportType(name) => format!("unsupported report type: {}", name),
            Self::CircuitOpen { .. } => "service temporarily unavailable".to_string(),
            Self::Query { .. } | Self::Config(_) | Self::Unavailable(_) => {
                "report generation failed".to_string()
            }
        }
    }

    /// HTTP-style status the outer layer should map this error to.
    #[must_use]
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnsupportedReportType(_) => 400,
            Self::CircuitOpen { .. } | Self::Unavailable(_) => 503,
            Self::Query { .. } | Self::Config(_) => 500,
        }
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Query { .. } => "query",
            Self::UnsupportedReportType(_) => "unsupported_report_type",
            Self::Config(_) => "config",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Whether retrying later may succeed without changing the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Unavailable(_))
    }
}

/// Result alias for report engine operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Statements are logged and carried in errors, keep them bounded.
pub(crate) fn truncate_statement(sql: &str) -> String {
    const MAX: usize = 200;
    let compact: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.len() <= MAX {
        compact
    } else {
        let mut end = MAX;
        while !compact.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &compact[..end])
    }
}
