// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Report orchestration: cache lookup, query, aggregation, cache fill.

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::aggregate::{self, average_ticket, growth_pct};
use super::models::{ReportData, ReportEnvelope, SummaryMetrics};
use super::query::{report_query, sortable_columns, summary_queries};
use super::request::{
    resolve_date_range, Pagination, ReportFilters, ReportPeriod, ReportRequest, ReportType,
};
use crate::cache::{derive_key, CacheTier};
use crate::config::ReportEngineConfig;
use crate::error::{ReportError, Result};
use crate::metrics;
use crate::storage::backend::DataBackend;
use crate::storage::traits::FetchMode;

/// Parameters that identify a report result in the cache.
#[derive(Serialize)]
struct CacheKeyParams<'a> {
    report_type: ReportType,
    period: ReportPeriod,
    start_date: NaiveDate,
    end_date: NaiveDate,
    filters: Option<&'a ReportFilters>,
    pagination: Option<&'a Pagination>,
}

/// Turns report requests into envelopes.
///
/// Holds shared handles to the process-wide backend and cache; clone the
/// `Arc`s, not the engine, to share them with other components.
pub struct ReportEngine {
    backend: Arc<DataBackend>,
    cache: Arc<CacheTier>,
    report_ttl: Duration,
}

impl ReportEngine {
    pub fn new(backend: Arc<DataBackend>, cache: Arc<CacheTier>, report_ttl: Duration) -> Self {
        Self { backend, cache, report_ttl }
    }

    /// Connect the backend (with fallback) and the cache tier once.
    pub async fn from_config(config: &ReportEngineConfig) -> Result<Self> {
        config.validate()?;
        let backend = DataBackend::initialize(config).await?;
        let cache = CacheTier::from_config(config).await;
        Ok(Self::new(Arc::new(backend), Arc::new(cache), config.report_cache_ttl()))
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<DataBackend> {
        &self.backend
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheTier> {
        &self.cache
    }

    #[must_use]
    pub fn report_ttl(&self) -> Duration {
        self.report_ttl
    }

    /// Generate a report with relative periods ending today (local time).
    pub async fn generate(&self, request: &ReportRequest) -> Result<ReportEnvelope> {
        self.generate_as_of(request, Local::now().date_naive()).await
    }

    /// Generate a report with relative periods ending on `today`.
    #[tracing::instrument(
        skip(self, request),
        fields(report_type = %request.report_type, period = %request.period)
    )]
    pub async fn generate_as_of(&self, request: &ReportRequest, today: NaiveDate) -> Result<ReportEnvelope> {
        let started = Instant::now();
        let result = self.run(request, today, started).await;

        match &result {
            Ok(envelope) => {
                let source = if envelope.cached { "cache" } else { "query" };
                metrics::record_report(request.report_type.as_str(), source);
                metrics::record_report_latency(request.report_type.as_str(), started.elapsed());
            }
            Err(e) => {
                metrics::record_error("reports", e.kind());
                warn!(error = %e, kind = e.kind(), "Report generation failed");
            }
        }
        result
    }

    async fn run(&self, request: &ReportRequest, today: NaiveDate, started: Instant) -> Result<ReportEnvelope> {
        request.validate()?;
        check_sort_field(request)?;

        let (start_date, end_date) = match request.report_type {
            ReportType::Summary => (today, today),
            _ => resolve_date_range(
                request.period,
                request.date_range.map(|r| r.start_date),
                request.date_range.map(|r| r.end_date),
                today,
            )?,
        };

        let key = cache_key(request, start_date, end_date);
        if let Some(mut envelope) = self.cache.get::<ReportEnvelope>(&key).await {
            debug!(key = %key, "Report served from cache");
            envelope.cached = true;
            envelope.execution_time_ms = None;
            envelope.period = request.period;
            envelope.format = request.format;
            envelope.include_charts = request.include_charts;
            return Ok(envelope);
        }

        let data = match request.report_type {
            ReportType::Summary => ReportData::Summary(self.summary(today).await?),
            report_type => self.list_report(report_type, request, start_date, end_date).await?,
        };

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let envelope = ReportEnvelope {
            report_type: request.report_type,
            period: request.period,
            start_date,
            end_date,
            format: request.format,
            include_charts: request.include_charts,
            generated_at: Utc::now(),
            data,
            cached: false,
            execution_time_ms: Some(execution_time_ms),
        };

        let stored = self.cache.set(&key, &envelope, Some(self.report_ttl)).await;
        info!(
            rows = envelope.data.row_count(),
            %start_date,
            %end_date,
            execution_time_ms,
            cached_for_reuse = stored,
            "Report generated"
        );
        Ok(envelope)
    }

    async fn list_report(
        &self,
        report_type: ReportType,
        request: &ReportRequest,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ReportData> {
        let query = report_query(
            report_type,
            self.backend.backend_kind(),
            start,
            end,
            request.filters.as_ref(),
            request.pagination.as_ref(),
        )
        .ok_or_else(|| ReportError::UnsupportedReportType(report_type.to_string()))?;

        let records = self.backend.query(&query.sql, &query.params, FetchMode::All).await?;

        Ok(match report_type {
            ReportType::Sales => ReportData::Sales(aggregate::sales_report(&records)?),
            ReportType::Products => ReportData::Products(aggregate::products_report(&records)?),
            ReportType::Customers => ReportData::Customers(aggregate::customers_report(&records)?),
            ReportType::RevenueByCategory => {
                ReportData::RevenueByCategory(aggregate::revenue_by_category_report(&records)?)
            }
            ReportType::HourlySales => ReportData::HourlySales(aggregate::hourly_sales_report(&records)?),
            ReportType::Summary => {
                return Err(ReportError::UnsupportedReportType(report_type.to_string()));
            }
        })
    }

    async fn summary(&self, today: NaiveDate) -> Result<SummaryMetrics> {
        let q = summary_queries(self.backend.backend_kind(), today);

        // One at a time: a recovery probe must report before the next statement is admitted
        let today_row = self.backend.fetch_one(&q.today.sql, &q.today.params).await?;
        let yesterday_row = self.backend.fetch_one(&q.yesterday.sql, &q.yesterday.params).await?;
        let top_row = self.backend.fetch_one(&q.top_product.sql, &q.top_product.params).await?;
        let active_row = self
            .backend
            .fetch_one(&q.active_customers.sql, &q.active_customers.params)
            .await?;

        let (today_orders, today_revenue) = match &today_row {
            Some(r) => (aggregate::i64_col(r, "order_count")?, aggregate::f64_col(r, "revenue")?),
            None => (0, 0.0),
        };
        let yesterday_revenue = match &yesterday_row {
            Some(r) => aggregate::f64_col(r, "revenue")?,
            None => 0.0,
        };
        let top_product_today = match &top_row {
            Some(r) => aggregate::opt_str_col(r, "name")?,
            None => None,
        };
        let active_customers_30d = match &active_row {
            Some(r) => aggregate::i64_col(r, "active_customers")?,
            None => 0,
        };

        Ok(SummaryMetrics {
            today_revenue,
            today_orders,
            today_average_ticket: average_ticket(today_revenue, today_orders),
            yesterday_revenue,
            revenue_growth_pct_vs_yesterday: growth_pct(today_revenue, yesterday_revenue),
            top_product_today,
            active_customers_30d,
        })
    }

    /// Drop every cached report, e.g. after a data import.
    pub async fn invalidate_cache(&self) -> u64 {
        self.cache.invalidate_reports().await
    }
}

fn check_sort_field(request: &ReportRequest) -> Result<()> {
    let Some(field) = request.pagination.as_ref().and_then(|p| p.sort_by.as_deref()) else {
        return Ok(());
    };
    if sortable_columns(request.report_type).contains(&field) {
        Ok(())
    } else {
        Err(ReportError::Validation(format!(
            "cannot sort {} report by '{}'",
            request.report_type, field
        )))
    }
}

fn cache_key(request: &ReportRequest, start_date: NaiveDate, end_date: NaiveDate) -> String {
    let prefix = format!("report:{}", request.report_type);
    let params = match request.report_type {
        ReportType::Summary => CacheKeyParams {
            report_type: request.report_type,
            period: ReportPeriod::Day,
            start_date,
            end_date,
            filters: None,
            pagination: None,
        },
        _ => CacheKeyParams {
            report_type: request.report_type,
            period: request.period,
            start_date,
            end_date,
            filters: request.filters.as_ref().filter(|f| !f.is_empty()),
            pagination: request.pagination.as_ref(),
        },
    };
    derive_key(&prefix, &params)
}
