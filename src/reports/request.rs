// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Validated report requests and date range resolution.

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ReportError, Result};

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Sales,
    Products,
    Customers,
    RevenueByCategory,
    HourlySales,
    Summary,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        Self::Sales,
        Self::Products,
        Self::Customers,
        Self::RevenueByCategory,
        Self::HourlySales,
        Self::Summary,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Products => "products",
            Self::Customers => "customers",
            Self::RevenueByCategory => "revenue_by_category",
            Self::HourlySales => "hourly_sales",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ReportError::UnsupportedReportType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
    Year,
    Custom,
}

impl ReportPeriod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
            Self::Custom => "custom",
        }
    }

    /// Days before today a fixed period starts. None for `Custom`.
    #[must_use]
    pub fn lookback_days(&self) -> Option<i64> {
        match self {
            Self::Day => Some(0),
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::Quarter => Some(90),
            Self::Year => Some(365),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            "custom" => Ok(Self::Custom),
            other => Err(ReportError::Validation(format!("unknown period '{}'", other))),
        }
    }
}

/// Output format. Rendering happens outside the engine; it is carried through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Pdf,
    Excel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Value stored in `orders.status`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
}

impl ReportFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, amount) in [("min_amount", self.min_amount), ("max_amount", self.max_amount)] {
            if let Some(v) = amount {
                if !v.is_finite() || v < 0.0 {
                    return Err(ReportError::Validation(format!("{} must be a non-negative number", name)));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if max < min {
                return Err(ReportError::Validation(
                    "max_amount must be greater than or equal to min_amount".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

fn default_page() -> u32 { 1 }
fn default_page_size() -> u32 { DEFAULT_PAGE_SIZE }

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            sort_by: None,
            order: SortOrder::default(),
        }
    }
}

impl Pagination {
    #[must_use]
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size, ..Default::default() }
    }

    #[must_use]
    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.order = order;
        self
    }

    /// Rows skipped before this page
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(ReportError::Validation("page must be at least 1".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ReportError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if let Some(field) = &self.sort_by {
            if !is_identifier(field) {
                return Err(ReportError::Validation(format!("invalid sort field '{}'", field)));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An analytics request as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub report_type: ReportType,
    #[serde(default)]
    pub period: ReportPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ReportFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default = "default_include_charts")]
    pub include_charts: bool,
}

fn default_include_charts() -> bool { true }

impl ReportRequest {
    #[must_use]
    pub fn builder(report_type: ReportType, period: ReportPeriod) -> ReportRequestBuilder {
        ReportRequestBuilder {
            request: ReportRequest {
                report_type,
                period,
                date_range: None,
                filters: None,
                pagination: None,
                format: ReportFormat::default(),
                include_charts: default_include_charts(),
            },
        }
    }

    /// Check invariants a deserialized request may have skipped.
    pub fn validate(&self) -> Result<()> {
        match (self.period, self.date_range) {
            (ReportPeriod::Custom, None) => {
                return Err(ReportError::Validation(
                    "start_date and end_date are required for a custom period".into(),
                ));
            }
            (_, Some(range)) if range.start_date > range.end_date => {
                return Err(ReportError::Validation(
                    "end_date must be on or after start_date".into(),
                ));
            }
            _ => {}
        }
        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        if let Some(pagination) = &self.pagination {
            pagination.validate()?;
        }
        Ok(())
    }
}

pub struct ReportRequestBuilder {
    request: ReportRequest,
}

impl ReportRequestBuilder {
    #[must_use]
    pub fn date_range(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.request.date_range = Some(DateRange { start_date, end_date });
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: ReportFilters) -> Self {
        self.request.filters = Some(filters);
        self
    }

    #[must_use]
    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.request.pagination = Some(pagination);
        self
    }

    #[must_use]
    pub fn format(mut self, format: ReportFormat) -> Self {
        self.request.format = format;
        self
    }

    #[must_use]
    pub fn include_charts(mut self, include: bool) -> Self {
        self.request.include_charts = include;
        self
    }

    pub fn build(self) -> Result<ReportRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

/// Resolve a period into an inclusive `[start, end]` day range ending today.
///
/// `Custom` returns the explicit bounds, which must both be present and
/// ordered. Explicit bounds are ignored for the fixed periods.
pub fn resolve_date_range(
    period: ReportPeriod,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    match period.lookback_days() {
        Some(days) => Ok((today - ChronoDuration::days(days), today)),
        None => match (start, end) {
            (Some(start), Some(end)) if start <= end => Ok((start, end)),
            (Some(_), Some(_)) => Err(ReportError::Validation(
                "end_date must be on or after start_date".into(),
            )),
            _ => Err(ReportError::Validation(
                "start_date and end_date are required for a custom period".into(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fixed_period_offsets() {
        let today = day(2024, 6, 15);
        let cases = [
            (ReportPeriod::Day, day(2024, 6, 15)),
            (ReportPeriod::Week, day(2024, 6, 8)),
            (ReportPeriod::Month, day(2024, 5, 16)),
            (ReportPeriod::Quarter, day(2024, 3, 17)),
            (ReportPeriod::Year, day(2023, 6, 16)),
        ];
        for (period, expected_start) in cases {
            let (start, end) = resolve_date_range(period, None, None, today).unwrap();
            assert_eq!(start, expected_start, "{period}");
            assert_eq!(end, today);
        }
    }

    #[test]
    fn test_custom_period_requires_both_bounds() {
        let today = day(2024, 6, 15);
        let err = resolve_date_range(ReportPeriod::Custom, Some(day(2024, 1, 1)), None, today).unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        let err = resolve_date_range(ReportPeriod::Custom, Some(day(2024, 2, 1)), Some(day(2024, 1, 1)), today)
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        let range = resolve_date_range(ReportPeriod::Custom, Some(day(2024, 1, 1)), Some(day(2024, 1, 31)), today)
            .unwrap();
        assert_eq!(range, (day(2024, 1, 1), day(2024, 1, 31)));
    }

    #[test]
    fn test_builder_validates() {
        let err = ReportRequest::builder(ReportType::Sales, ReportPeriod::Custom).build().unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        let err = ReportRequest::builder(ReportType::Sales, ReportPeriod::Custom)
            .date_range(day(2024, 3, 1), day(2024, 2, 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        let err = ReportRequest::builder(ReportType::Sales, ReportPeriod::Week)
            .filters(ReportFilters { min_amount: Some(100.0), max_amount: Some(10.0), ..Default::default() })
            .build()
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        let ok = ReportRequest::builder(ReportType::Products, ReportPeriod::Month)
            .pagination(Pagination::new(2, 25).sorted_by("revenue", SortOrder::Desc))
            .build()
            .unwrap();
        assert_eq!(ok.pagination.unwrap().offset(), 25);
    }

    #[test]
    fn test_pagination_bounds() {
        assert!(Pagination::new(0, 10).validate().is_err());
        assert!(Pagination::new(1, 0).validate().is_err());
        assert!(Pagination::new(1, 501).validate().is_err());
        assert!(Pagination::new(1, 500).validate().is_ok());
        assert!(Pagination::new(1, 10).sorted_by("revenue; DROP TABLE orders", SortOrder::Asc).validate().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let filters = ReportFilters { min_amount: Some(-1.0), ..Default::default() };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn test_report_type_from_str() {
        assert_eq!("hourly_sales".parse::<ReportType>().unwrap(), ReportType::HourlySales);
        let err = "inventory".parse::<ReportType>().unwrap_err();
        assert_eq!(err, ReportError::UnsupportedReportType("inventory".into()));
    }

    #[test]
    fn test_deserialize_request_with_defaults() {
        let request: ReportRequest = serde_json::from_str(
            r#"{"report_type": "revenue_by_category", "filters": {"status": "COMPLETED"}}"#,
        )
        .unwrap();
        assert_eq!(request.period, ReportPeriod::Week);
        assert_eq!(request.format, ReportFormat::Json);
        assert!(request.include_charts);
        assert_eq!(request.filters.unwrap().status, Some(OrderStatus::Completed));
    }
}
