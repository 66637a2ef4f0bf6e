// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-engine SQL fragments.
//!
//! Both engines accept `?` placeholders, so statements only differ in the
//! functions they call. The sqlx `Any` driver decodes nothing but integers,
//! doubles, text and blobs, so aggregates are cast explicitly: MySQL `SUM`
//! over DECIMAL would otherwise come back undecodable.

use crate::config::BackendKind;

impl BackendKind {
    /// `YYYY-MM-DD` text label for a timestamp column.
    #[must_use]
    pub fn day_label(&self, column: &str) -> String {
        match self {
            Self::Mysql => format!("DATE_FORMAT({}, '%Y-%m-%d')", column),
            Self::Sqlite => format!("DATE({})", column),
        }
    }

    /// Day-truncated expression comparable with a bound `SqlValue::Date`.
    #[must_use]
    pub fn day_of(&self, column: &str) -> String {
        // Same spelling on both engines; MySQL compares DATE against text implicitly
        format!("DATE({})", column)
    }

    /// Hour of day (0-23) as an integer.
    #[must_use]
    pub fn hour_of(&self, column: &str) -> String {
        match self {
            Self::Mysql => format!("CAST(HOUR({}) AS SIGNED)", column),
            Self::Sqlite => format!("CAST(strftime('%H', {}) AS INTEGER)", column),
        }
    }

    #[must_use]
    pub fn as_real(&self, expr: &str) -> String {
        match self {
            Self::Mysql => format!("CAST({} AS DOUBLE)", expr),
            Self::Sqlite => format!("CAST({} AS REAL)", expr),
        }
    }

    #[must_use]
    pub fn as_integer(&self, expr: &str) -> String {
        match self {
            Self::Mysql => format!("CAST({} AS SIGNED)", expr),
            Self::Sqlite => format!("CAST({} AS INTEGER)", expr),
        }
    }

    /// String concatenation of the given expressions.
    #[must_use]
    pub fn concat(&self, parts: &[&str]) -> String {
        match self {
            Self::Mysql => format!("CONCAT({})", parts.join(", ")),
            Self::Sqlite => parts.join(" || "),
        }
    }

    /// Cheapest statement that proves a connection works.
    #[must_use]
    pub fn ping_statement(&self) -> &'static str {
        "SELECT 1"
    }
}
