// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL for each report type.
//!
//! Statements read `orders o`, `order_items oi`, `products pr`,
//! `categories c` and `customers u`. Base statements carry the date range
//! predicate; [`build_filtered_query`] splices optional filters in ahead of
//! the grouping clause and [`apply_pagination`] appends ordering and limits.

use chrono::NaiveDate;

use super::request::{OrderStatus, Pagination, ReportFilters, ReportType};
use crate::config::BackendKind;
use crate::storage::traits::SqlValue;

/// Status an order must carry to count as revenue
pub const COMPLETED: &str = "COMPLETED";

const PRODUCTS_LIMIT: u32 = 10;
const CUSTOMERS_LIMIT: u32 = 20;

/// A statement ready for [`crate::DataBackend::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Output columns a report may be sorted by.
#[must_use]
pub fn sortable_columns(report_type: ReportType) -> &'static [&'static str] {
    match report_type {
        ReportType::Sales => &["period_label", "total_sales", "order_count", "average_ticket"],
        ReportType::Products => &["product_id", "name", "category", "units_sold", "revenue"],
        ReportType::Customers => &[
            "customer_id",
            "username",
            "full_name",
            "order_count",
            "total_spent",
            "average_ticket",
            "last_order_date",
        ],
        ReportType::RevenueByCategory => &["category", "revenue", "units_sold"],
        ReportType::HourlySales => &["hour", "total_sales", "order_count"],
        ReportType::Summary => &[],
    }
}

/// Ordering and row cap used when the request carries no pagination.
fn default_ordering(report_type: ReportType) -> (&'static str, Option<u32>) {
    match report_type {
        ReportType::Sales => ("period_label ASC", None),
        ReportType::Products => ("units_sold DESC", Some(PRODUCTS_LIMIT)),
        ReportType::Customers => ("total_spent DESC", Some(CUSTOMERS_LIMIT)),
        ReportType::RevenueByCategory => ("revenue DESC", None),
        ReportType::HourlySales => ("hour ASC", None),
        ReportType::Summary => ("", None),
    }
}

fn date_window(kind: BackendKind) -> String {
    let day = kind.day_of("o.order_date");
    format!("{day} >= ? AND {day} <= ?")
}

/// Grouped statement for a list report, before filters and ordering.
/// `None` for the summary, which runs its own fixed statements.
#[must_use]
pub fn base_query(report_type: ReportType, kind: BackendKind) -> Option<String> {
    let window = date_window(kind);
    let sql = match report_type {
        ReportType::Sales => format!(
            "SELECT {label} AS period_label, {total} AS total_sales, {count} AS order_count, \
             {avg} AS average_ticket \
             FROM orders o \
             WHERE o.status = '{COMPLETED}' AND {window} \
             GROUP BY {label}",
            label = kind.day_label("o.order_date"),
            total = kind.as_real("SUM(o.total)"),
            count = kind.as_integer("COUNT(*)"),
            avg = kind.as_real("AVG(o.total)"),
        ),
        ReportType::Products => format!(
            "SELECT pr.id AS product_id, pr.name AS name, \
             COALESCE(c.name, 'Uncategorized') AS category, \
             {units} AS units_sold, {revenue} AS revenue \
             FROM order_items oi \
             JOIN products pr ON oi.product_id = pr.id \
             LEFT JOIN categories c ON pr.category_id = c.id \
             JOIN orders o ON oi.order_id = o.id \
             WHERE o.status = '{COMPLETED}' AND {window} \
             GROUP BY pr.id, pr.name, c.name",
            units = kind.as_integer("SUM(oi.quantity)"),
            revenue = kind.as_real("SUM(oi.unit_price * oi.quantity)"),
        ),
        ReportType::Customers => format!(
            "SELECT u.id AS customer_id, u.username AS username, {full_name} AS full_name, \
             {count} AS order_count, {spent} AS total_spent, {avg} AS average_ticket, \
             {last} AS last_order_date \
             FROM customers u \
             JOIN orders o ON u.id = o.customer_id \
             WHERE {window} \
             GROUP BY u.id, u.username, u.first_name, u.last_name",
            full_name = kind.concat(&["COALESCE(u.first_name, '')", "' '", "COALESCE(u.last_name, '')"]),
            count = kind.as_integer("COUNT(o.id)"),
            spent = kind.as_real("SUM(o.total)"),
            avg = kind.as_real("AVG(o.total)"),
            last = kind.day_label("MAX(o.order_date)"),
        ),
        ReportType::RevenueByCategory => format!(
            "SELECT COALESCE(c.name, 'Uncategorized') AS category, {revenue} AS revenue, \
             {units} AS units_sold \
             FROM order_items oi \
             JOIN products pr ON oi.product_id = pr.id \
             LEFT JOIN categories c ON pr.category_id = c.id \
             JOIN orders o ON oi.order_id = o.id \
             WHERE o.status = '{COMPLETED}' AND {window} \
             GROUP BY c.name",
            revenue = kind.as_real("SUM(oi.unit_price * oi.quantity)"),
            units = kind.as_integer("SUM(oi.quantity)"),
        ),
        ReportType::HourlySales => format!(
            "SELECT {hour} AS hour, {total} AS total_sales, {count} AS order_count \
             FROM orders o \
             WHERE o.status = '{COMPLETED}' AND {window} \
             GROUP BY {hour}",
            hour = kind.hour_of("o.order_date"),
            total = kind.as_real("SUM(o.total)"),
            count = kind.as_integer("COUNT(*)"),
        ),
        ReportType::Summary => return None,
    };
    Some(sql)
}

/// Full statement and parameters for a list report.
#[must_use]
pub fn report_query(
    report_type: ReportType,
    kind: BackendKind,
    start: NaiveDate,
    end: NaiveDate,
    filters: Option<&ReportFilters>,
    pagination: Option<&Pagination>,
) -> Option<ReportQuery> {
    let base = base_query(report_type, kind)?;
    let (filtered, filter_params) = build_filtered_query(&base, filters);
    let (default_order, default_limit) = default_ordering(report_type);
    let sql = apply_pagination(&filtered, pagination, default_order, default_limit);

    let mut params = vec![SqlValue::Date(start), SqlValue::Date(end)];
    params.extend(filter_params);
    Some(ReportQuery { sql, params })
}

/// The four fixed statements behind the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryQueries {
    pub today: ReportQuery,
    pub yesterday: ReportQuery,
    pub top_product: ReportQuery,
    pub active_customers: ReportQuery,
}

/// Days of history counted as "active" for the summary
pub const ACTIVE_CUSTOMER_DAYS: i64 = 30;

#[must_use]
pub fn summary_queries(kind: BackendKind, today: NaiveDate) -> SummaryQueries {
    let day = kind.day_of("o.order_date");
    let revenue = kind.as_real("COALESCE(SUM(o.total), 0)");
    let yesterday = today - chrono::Duration::days(1);
    let active_since = today - chrono::Duration::days(ACTIVE_CUSTOMER_DAYS);

    SummaryQueries {
        today: ReportQuery {
            sql: format!(
                "SELECT {count} AS order_count, {revenue} AS revenue \
                 FROM orders o WHERE o.status = '{COMPLETED}' AND {day} = ?",
                count = kind.as_integer("COUNT(*)"),
            ),
            params: vec![SqlValue::Date(today)],
        },
        yesterday: ReportQuery {
            sql: format!(
                "SELECT {revenue} AS revenue \
                 FROM orders o WHERE o.status = '{COMPLETED}' AND {day} = ?"
            ),
            params: vec![SqlValue::Date(yesterday)],
        },
        top_product: ReportQuery {
            sql: format!(
                "SELECT pr.name AS name, {units} AS units_sold \
                 FROM order_items oi \
                 JOIN products pr ON oi.product_id = pr.id \
                 JOIN orders o ON oi.order_id = o.id \
                 WHERE o.status = '{COMPLETED}' AND {day} = ? \
                 GROUP BY pr.id, pr.name \
                 ORDER BY units_sold DESC, pr.name ASC LIMIT 1",
                units = kind.as_integer("SUM(oi.quantity)"),
            ),
            params: vec![SqlValue::Date(today)],
        },
        active_customers: ReportQuery {
            sql: format!(
                "SELECT {distinct} AS active_customers \
                 FROM orders o WHERE o.status = '{COMPLETED}' AND {day} >= ? AND {day} <= ?",
                distinct = kind.as_integer("COUNT(DISTINCT o.customer_id)"),
            ),
            params: vec![SqlValue::Date(active_since), SqlValue::Date(today)],
        },
    }
}

/// Splice filter predicates into `base_sql`.
///
/// Predicates go ahead of the first top-level `GROUP BY`, `HAVING`,
/// `ORDER BY` or `LIMIT`, joined with `AND` when a `WHERE` is already
/// present. Parameters come back in placeholder order. Product and category
/// filters select orders containing a matching line item.
#[must_use]
pub fn build_filtered_query(base_sql: &str, filters: Option<&ReportFilters>) -> (String, Vec<SqlValue>) {
    let Some(filters) = filters else {
        return (base_sql.to_string(), Vec::new());
    };

    let mut predicates: Vec<&str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(id) = filters.customer_id {
        predicates.push("o.customer_id = ?");
        params.push(SqlValue::Int(id));
    }
    if let Some(id) = filters.product_id {
        predicates.push(
            "EXISTS (SELECT 1 FROM order_items fi WHERE fi.order_id = o.id AND fi.product_id = ?)",
        );
        params.push(SqlValue::Int(id));
    }
    if let Some(id) = filters.category_id {
        predicates.push(
            "EXISTS (SELECT 1 FROM order_items fi JOIN products fp ON fi.product_id = fp.id \
             WHERE fi.order_id = o.id AND fp.category_id = ?)",
        );
        params.push(SqlValue::Int(id));
    }
    if let Some(status) = filters.status {
        predicates.push("o.status = ?");
        params.push(SqlValue::Text(OrderStatus::as_str(&status).to_string()));
    }
    if let Some(min) = filters.min_amount {
        predicates.push("o.total >= ?");
        params.push(SqlValue::Float(min));
    }
    if let Some(max) = filters.max_amount {
        predicates.push("o.total <= ?");
        params.push(SqlValue::Float(max));
    }

    if predicates.is_empty() {
        return (base_sql.to_string(), params);
    }

    let clauses = scan_clauses(base_sql);
    let joiner = if clauses.has_where { "AND" } else { "WHERE" };
    let (head, tail) = base_sql.split_at(clauses.insert_at);
    let head = head.trim_end();
    let sql = if tail.is_empty() {
        format!("{} {} {}", head, joiner, predicates.join(" AND "))
    } else {
        format!("{} {} {} {}", head, joiner, predicates.join(" AND "), tail)
    };
    (sql, params)
}

/// Append ordering and limits.
///
/// With pagination the requested sort (or the report default) is applied
/// and `LIMIT/OFFSET` selects the page. Without it the report default order
/// and row cap apply. `sort_by` must already be checked against
/// [`sortable_columns`].
#[must_use]
pub fn apply_pagination(
    sql: &str,
    pagination: Option<&Pagination>,
    default_order: &str,
    default_limit: Option<u32>,
) -> String {
    let mut out = sql.trim_end().to_string();
    match pagination {
        Some(p) => {
            match &p.sort_by {
                Some(field) => out.push_str(&format!(" ORDER BY {} {}", field, p.order.as_sql())),
                None if !default_order.is_empty() => out.push_str(&format!(" ORDER BY {}", default_order)),
                None => {}
            }
            out.push_str(&format!(" LIMIT {} OFFSET {}", p.page_size, p.offset()));
        }
        None => {
            if !default_order.is_empty() {
                out.push_str(&format!(" ORDER BY {}", default_order));
            }
            if let Some(limit) = default_limit {
                out.push_str(&format!(" LIMIT {}", limit));
            }
        }
    }
    out
}

struct ClauseScan {
    has_where: bool,
    insert_at: usize,
}

/// Locate top-level WHERE and the first trailing clause, skipping quoted
/// text and parenthesised subqueries.
fn scan_clauses(sql: &str) -> ClauseScan {
    const TRAILING: [&str; 4] = ["GROUP", "HAVING", "ORDER", "LIMIT"];

    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut has_where = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && b.is_ascii_alphabetic() && !is_word_byte(bytes, i.wrapping_sub(1)) => {
                let end = (i..bytes.len()).find(|&j| !is_word_byte(bytes, j)).unwrap_or(bytes.len());
                let word = &sql[i..end];
                if word.eq_ignore_ascii_case("WHERE") {
                    has_where = true;
                } else if TRAILING.iter().any(|k| word.eq_ignore_ascii_case(k)) {
                    return ClauseScan { has_where, insert_at: i };
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    ClauseScan { has_where, insert_at: sql.len() }
}

fn is_word_byte(bytes: &[u8], i: usize) -> bool {
    bytes.get(i).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::request::SortOrder;
    use crate::storage::backend::count_placeholders;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_filters_land_before_group_by() {
        let base = "SELECT a FROM orders o WHERE o.status = 'COMPLETED' GROUP BY a";
        let filters = ReportFilters { customer_id: Some(7), min_amount: Some(10.0), ..Default::default() };
        let (sql, params) = build_filtered_query(base, Some(&filters));
        assert_eq!(
            sql,
            "SELECT a FROM orders o WHERE o.status = 'COMPLETED' AND o.customer_id = ? AND o.total >= ? GROUP BY a"
        );
        assert_eq!(params, vec![SqlValue::Int(7), SqlValue::Float(10.0)]);
    }

    #[test]
    fn test_filters_add_where_when_missing() {
        let (sql, params) = build_filtered_query(
            "SELECT a FROM orders o ORDER BY a",
            Some(&ReportFilters { status: Some(OrderStatus::Cancelled), ..Default::default() }),
        );
        assert_eq!(sql, "SELECT a FROM orders o WHERE o.status = ? ORDER BY a");
        assert_eq!(params, vec![SqlValue::Text("CANCELLED".into())]);

        let (sql, _) = build_filtered_query(
            "SELECT a FROM orders o",
            Some(&ReportFilters { customer_id: Some(1), ..Default::default() }),
        );
        assert_eq!(sql, "SELECT a FROM orders o WHERE o.customer_id = ?");
    }

    #[test]
    fn test_keywords_inside_subqueries_and_literals_ignored() {
        let base = "SELECT a, (SELECT MAX(b) FROM t GROUP BY c LIMIT 1) AS m FROM orders o \
                    WHERE o.note <> 'ORDER BY' GROUP BY a";
        let filters = ReportFilters { customer_id: Some(1), ..Default::default() };
        let (sql, _) = build_filtered_query(base, Some(&filters));
        assert!(sql.ends_with("WHERE o.note <> 'ORDER BY' AND o.customer_id = ? GROUP BY a"), "{sql}");
    }

    #[test]
    fn test_no_filters_is_identity() {
        let base = "SELECT a FROM orders o GROUP BY a";
        assert_eq!(build_filtered_query(base, None), (base.to_string(), vec![]));
        assert_eq!(
            build_filtered_query(base, Some(&ReportFilters::default())),
            (base.to_string(), vec![])
        );
    }

    #[test]
    fn test_pagination_clauses() {
        let p = Pagination::new(3, 20).sorted_by("revenue", SortOrder::Asc);
        assert_eq!(
            apply_pagination("SELECT 1", Some(&p), "units_sold DESC", Some(10)),
            "SELECT 1 ORDER BY revenue ASC LIMIT 20 OFFSET 40"
        );
        assert_eq!(
            apply_pagination("SELECT 1", Some(&Pagination::default()), "units_sold DESC", Some(10)),
            "SELECT 1 ORDER BY units_sold DESC LIMIT 50 OFFSET 0"
        );
        assert_eq!(
            apply_pagination("SELECT 1", None, "units_sold DESC", Some(10)),
            "SELECT 1 ORDER BY units_sold DESC LIMIT 10"
        );
        assert_eq!(apply_pagination("SELECT 1", None, "hour ASC", None), "SELECT 1 ORDER BY hour ASC");
    }

    #[test]
    fn test_param_count_matches_placeholders() {
        let filters = ReportFilters {
            customer_id: Some(1),
            product_id: Some(2),
            category_id: Some(3),
            status: Some(OrderStatus::Completed),
            min_amount: Some(1.0),
            max_amount: Some(500.0),
        };
        for kind in [BackendKind::Mysql, BackendKind::Sqlite] {
            for report_type in ReportType::ALL {
                let Some(query) = report_query(
                    report_type,
                    kind,
                    day(2024, 1, 1),
                    day(2024, 1, 31),
                    Some(&filters),
                    Some(&Pagination::default()),
                ) else {
                    assert_eq!(report_type, ReportType::Summary);
                    continue;
                };
                assert_eq!(count_placeholders(&query.sql), query.params.len(), "{kind} {report_type}");
                assert_eq!(query.params[0], SqlValue::Date(day(2024, 1, 1)));
            }
        }
    }

    #[test]
    fn test_default_caps() {
        let q = report_query(ReportType::Products, BackendKind::Sqlite, day(2024, 1, 1), day(2024, 1, 2), None, None)
            .unwrap();
        assert!(q.sql.ends_with("ORDER BY units_sold DESC LIMIT 10"));
        let q = report_query(ReportType::Customers, BackendKind::Mysql, day(2024, 1, 1), day(2024, 1, 2), None, None)
            .unwrap();
        assert!(q.sql.contains("CONCAT("));
        assert!(q.sql.ends_with("ORDER BY total_spent DESC LIMIT 20"));
    }

    #[test]
    fn test_summary_statements_bind_expected_days() {
        let today = day(2024, 6, 15);
        let queries = summary_queries(BackendKind::Sqlite, today);
        assert_eq!(queries.yesterday.params, vec![SqlValue::Date(day(2024, 6, 14))]);
        assert_eq!(
            queries.active_customers.params,
            vec![SqlValue::Date(day(2024, 5, 16)), SqlValue::Date(today)]
        );
        for q in [&queries.today, &queries.yesterday, &queries.top_product, &queries.active_customers] {
            assert_eq!(count_placeholders(&q.sql), q.params.len());
        }
    }

    #[test]
    fn test_sortable_columns_cover_default_order() {
        for report_type in ReportType::ALL {
            let (order, _) = default_ordering(report_type);
            if let Some(column) = order.split_whitespace().next() {
                assert!(sortable_columns(report_type).contains(&column), "{report_type}");
            }
        }
    }
}
