// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Order analytics reports.
//!
//! ```text
//! ReportRequest ──► validate ──► resolve dates ──► cache key
//!                                                     │
//!                              hit ◄── CacheTier.get ─┤
//!                                                     ▼ miss
//!                      query (filters, pagination) ──► DataBackend
//!                                                     │
//!                       aggregate ──► envelope ──► CacheTier.set
//! ```

pub mod aggregate;
pub mod engine;
pub mod models;
pub mod query;
pub mod request;
pub mod schema;

pub use engine::ReportEngine;
pub use models::{
    CategoryRow, CustomerRow, CustomersReport, HourlyRow, HourlySalesReport, ProductRow, ProductsReport,
    ReportData, ReportEnvelope, RevenueByCategoryReport, SalesReport, SalesRow, SummaryMetrics,
};
pub use request::{
    resolve_date_range, DateRange, OrderStatus, Pagination, ReportFilters, ReportFormat, ReportPeriod,
    ReportRequest, ReportRequestBuilder, ReportType, SortOrder,
};
