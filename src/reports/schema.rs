// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tables the reports read.
//!
//! The statements are portable between both engines. Production MySQL
//! schemas are owned by migrations elsewhere; this exists to bootstrap an
//! embedded database.

use tracing::info;

use crate::error::Result;
use crate::storage::backend::DataBackend;

pub const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY,
        name VARCHAR(100) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY,
        name VARCHAR(200) NOT NULL,
        category_id INTEGER NULL REFERENCES categories(id)
    )",
    "CREATE TABLE IF NOT EXISTS customers (
        id INTEGER PRIMARY KEY,
        username VARCHAR(100) NOT NULL,
        first_name VARCHAR(100) NULL,
        last_name VARCHAR(100) NULL
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        order_date DATETIME NOT NULL,
        status VARCHAR(20) NOT NULL,
        total DECIMAL(12, 2) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY,
        order_id INTEGER NOT NULL REFERENCES orders(id),
        product_id INTEGER NOT NULL REFERENCES products(id),
        quantity INTEGER NOT NULL,
        unit_price DECIMAL(12, 2) NOT NULL
    )",
];

/// Create any missing report tables in one transaction.
pub async fn install(backend: &DataBackend) -> Result<()> {
    backend
        .transaction(|tx| {
            Box::pin(async move {
                for statement in TABLES {
                    tx.execute(statement, &[]).await?;
                }
                Ok(())
            })
        })
        .await?;
    info!(backend = %backend.backend_kind(), tables = TABLES.len(), "Report schema installed");
    Ok(())
}
