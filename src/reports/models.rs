// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Report payloads and the envelope they travel in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::request::{ReportFormat, ReportPeriod, ReportType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
    /// `YYYY-MM-DD`
    pub period_label: String,
    pub total_sales: f64,
    pub order_count: i64,
    pub average_ticket: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesReport {
    pub rows: Vec<SalesRow>,
    pub total_revenue: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub units_sold: i64,
    pub revenue: f64,
    /// Share of the revenue across the returned rows, 2 decimals
    pub pct_of_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductsReport {
    pub rows: Vec<ProductRow>,
    pub total_products: usize,
    pub total_units_sold: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub username: String,
    /// First and last name, or the username when both are blank
    pub full_name: String,
    pub order_count: i64,
    pub total_spent: f64,
    pub average_ticket: f64,
    pub last_order_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomersReport {
    pub rows: Vec<CustomerRow>,
    pub total_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub category: String,
    pub revenue: f64,
    pub units_sold: i64,
    pub pct_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueByCategoryReport {
    pub rows: Vec<CategoryRow>,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRow {
    /// 0-23
    pub hour: u8,
    pub total_sales: f64,
    pub order_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySalesReport {
    pub rows: Vec<HourlyRow>,
    pub peak_hour: Option<u8>,
    pub peak_revenue: f64,
}

/// Today-at-a-glance figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub today_revenue: f64,
    pub today_orders: i64,
    pub today_average_ticket: f64,
    pub yesterday_revenue: f64,
    /// Rounded to 2 decimals, 0 when yesterday had no revenue
    pub revenue_growth_pct_vs_yesterday: f64,
    pub top_product_today: Option<String>,
    /// Distinct customers with an order in the last 30 days
    pub active_customers_30d: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportData {
    Sales(SalesReport),
    Products(ProductsReport),
    Customers(CustomersReport),
    RevenueByCategory(RevenueByCategoryReport),
    HourlySales(HourlySalesReport),
    Summary(SummaryMetrics),
}

impl ReportData {
    #[must_use]
    pub fn report_type(&self) -> ReportType {
        match self {
            Self::Sales(_) => ReportType::Sales,
            Self::Products(_) => ReportType::Products,
            Self::Customers(_) => ReportType::Customers,
            Self::RevenueByCategory(_) => ReportType::RevenueByCategory,
            Self::HourlySales(_) => ReportType::HourlySales,
            Self::Summary(_) => ReportType::Summary,
        }
    }

    /// Rows carried by list reports; 1 for the summary.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Sales(r) => r.rows.len(),
            Self::Products(r) => r.rows.len(),
            Self::Customers(r) => r.rows.len(),
            Self::RevenueByCategory(r) => r.rows.len(),
            Self::HourlySales(r) => r.rows.len(),
            Self::Summary(_) => 1,
        }
    }
}

/// What [`crate::ReportEngine::generate`] returns and what the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub report_type: ReportType,
    pub period: ReportPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub format: ReportFormat,
    pub include_charts: bool,
    pub generated_at: DateTime<Utc>,
    pub data: ReportData,
    /// Served from the cache tier
    pub cached: bool,
    /// Wall time of the fresh computation; absent on cache hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_is_tagged_by_kind() {
        let data = ReportData::HourlySales(HourlySalesReport { rows: vec![], peak_hour: None, peak_revenue: 0.0 });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "hourly_sales");
        assert_eq!(data.report_type(), ReportType::HourlySales);

        let back: ReportData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_envelope_omits_time_on_hit() {
        let envelope = ReportEnvelope {
            report_type: ReportType::Summary,
            period: ReportPeriod::Day,
            start_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            format: ReportFormat::Json,
            include_charts: false,
            generated_at: Utc::now(),
            data: ReportData::Summary(SummaryMetrics {
                today_revenue: 0.0,
                today_orders: 0,
                today_average_ticket: 0.0,
                yesterday_revenue: 0.0,
                revenue_growth_pct_vs_yesterday: 0.0,
                top_product_today: None,
                active_customers_30d: 0,
            }),
            cached: true,
            execution_time_ms: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("execution_time_ms").is_none());
        assert_eq!(json["start_date"], "2024-06-15");
        assert_eq!(json["data"]["kind"], "summary");
        assert_eq!(json["data"]["revenue_growth_pct_vs_yesterday"], 0.0);
    }
}
