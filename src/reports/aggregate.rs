// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Derived figures and row decoding.

use serde_json::Value;

use super::models::{
    CategoryRow, CustomerRow, CustomersReport, HourlyRow, HourlySalesReport, ProductRow, ProductsReport,
    RevenueByCategoryReport, SalesReport, SalesRow,
};
use crate::error::{ReportError, Result};
use crate::storage::traits::Record;

/// Round half away from zero to 2 decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part` as a percentage of `total`, 2 decimals. 0 when `total` is not positive.
#[must_use]
pub fn pct_of_total(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        round2(part / total * 100.0)
    } else {
        0.0
    }
}

#[must_use]
pub fn average_ticket(revenue: f64, orders: i64) -> f64 {
    if orders > 0 {
        revenue / orders as f64
    } else {
        0.0
    }
}

/// Day-over-day growth in percent. 0 when the previous day had no revenue.
#[must_use]
pub fn growth_pct(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round2((current - previous) / previous * 100.0)
    } else {
        0.0
    }
}

/// Busiest hour by revenue; the earliest wins a tie.
#[must_use]
pub fn peak_hour(rows: &[HourlyRow]) -> Option<(u8, f64)> {
    rows.iter().fold(None, |best, row| match best {
        Some((_, revenue)) if revenue >= row.total_sales => best,
        _ => Some((row.hour, row.total_sales)),
    })
}

// Column readers. SQL NULL (an empty aggregate) reads as zero; a missing
// column means the statement and the decoder disagree.

fn column<'r>(record: &'r Record, name: &str) -> Result<&'r Value> {
    record
        .get(name)
        .ok_or_else(|| ReportError::query(name, format!("result set has no column '{}'", name)))
}

pub(crate) fn f64_col(record: &Record, name: &str) -> Result<f64> {
    Ok(match column(record, name)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

pub(crate) fn i64_col(record: &Record, name: &str) -> Result<i64> {
    Ok(match column(record, name)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

pub(crate) fn opt_str_col(record: &Record, name: &str) -> Result<Option<String>> {
    Ok(match column(record, name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

pub(crate) fn str_col(record: &Record, name: &str) -> Result<String> {
    Ok(opt_str_col(record, name)?.unwrap_or_default())
}

pub(crate) fn sales_report(records: &[Record]) -> Result<SalesReport> {
    let rows = records
        .iter()
        .map(|r| {
            Ok(SalesRow {
                period_label: str_col(r, "period_label")?,
                total_sales: f64_col(r, "total_sales")?,
                order_count: i64_col(r, "order_count")?,
                average_ticket: f64_col(r, "average_ticket")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_revenue: f64 = rows.iter().map(|r| r.total_sales).sum();
    let total_orders: i64 = rows.iter().map(|r| r.order_count).sum();
    Ok(SalesReport {
        average_ticket: average_ticket(total_revenue, total_orders),
        rows,
        total_revenue,
        total_orders,
    })
}

pub(crate) fn products_report(records: &[Record]) -> Result<ProductsReport> {
    let mut rows = records
        .iter()
        .map(|r| {
            Ok(ProductRow {
                product_id: i64_col(r, "product_id")?,
                name: str_col(r, "name")?,
                category: str_col(r, "category")?,
                units_sold: i64_col(r, "units_sold")?,
                revenue: f64_col(r, "revenue")?,
                pct_of_sales: 0.0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_revenue: f64 = rows.iter().map(|r| r.revenue).sum();
    for row in &mut rows {
        row.pct_of_sales = pct_of_total(row.revenue, total_revenue);
    }
    Ok(ProductsReport {
        total_products: rows.len(),
        total_units_sold: rows.iter().map(|r| r.units_sold).sum(),
        total_revenue,
        rows,
    })
}

pub(crate) fn customers_report(records: &[Record]) -> Result<CustomersReport> {
    let rows = records
        .iter()
        .map(|r| {
            let username = str_col(r, "username")?;
            let full_name = str_col(r, "full_name")?.trim().to_string();
            Ok(CustomerRow {
                customer_id: i64_col(r, "customer_id")?,
                full_name: if full_name.is_empty() { username.clone() } else { full_name },
                username,
                order_count: i64_col(r, "order_count")?,
                total_spent: f64_col(r, "total_spent")?,
                average_ticket: f64_col(r, "average_ticket")?,
                last_order_date: opt_str_col(r, "last_order_date")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CustomersReport { total_customers: rows.len(), rows })
}

pub(crate) fn revenue_by_category_report(records: &[Record]) -> Result<RevenueByCategoryReport> {
    let mut rows = records
        .iter()
        .map(|r| {
            Ok(CategoryRow {
                category: str_col(r, "category")?,
                revenue: f64_col(r, "revenue")?,
                units_sold: i64_col(r, "units_sold")?,
                pct_of_total: 0.0,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let total_revenue: f64 = rows.iter().map(|r| r.revenue).sum();
    for row in &mut rows {
        row.pct_of_total = pct_of_total(row.revenue, total_revenue);
    }
    Ok(RevenueByCategoryReport { rows, total_revenue })
}

pub(crate) fn hourly_sales_report(records: &[Record]) -> Result<HourlySalesReport> {
    let rows = records
        .iter()
        .map(|r| {
            let hour = i64_col(r, "hour")?;
            let hour = u8::try_from(hour)
                .ok()
                .filter(|h| *h < 24)
                .ok_or_else(|| ReportError::query("hour", format!("hour out of range: {}", hour)))?;
            Ok(HourlyRow {
                hour,
                total_sales: f64_col(r, "total_sales")?,
                order_count: i64_col(r, "order_count")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let peak = peak_hour(&rows);
    Ok(HourlySalesReport {
        peak_hour: peak.map(|(h, _)| h),
        peak_revenue: peak.map_or(0.0, |(_, r)| r),
        rows,
    })
}
