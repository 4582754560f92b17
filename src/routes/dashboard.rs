//! Dashboard statistics

use axum::{extract::State, response::IntoResponse};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::dashboard::{DashboardStats, LowStockVariant, StatusCount};
use crate::domain::orders::OrderStatus;
use crate::domain::products::ProductStatus;
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::cache::keys;

const STATS_TTL: Duration = Duration::from_secs(60);
const LOW_STOCK_LIMIT: i64 = 50;

/// One entry per known status in declaration order, zero when absent.
fn fill_statuses(rows: Vec<StatusCount>, statuses: &[&'static str]) -> Vec<StatusCount> {
    statuses
        .iter()
        .map(|status| StatusCount {
            status: status.to_string(),
            count: rows
                .iter()
                .find(|r| r.status == *status)
                .map(|r| r.count)
                .unwrap_or(0),
        })
        .collect()
}

async fn compute_stats(state: &AppState) -> ApiResult<DashboardStats> {
    let products = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM products GROUP BY status",
    )
    .fetch_all(&state.db)
    .await?;

    let total_customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&state.db)
        .await?;

    let orders = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM orders GROUP BY status",
    )
    .fetch_all(&state.db)
    .await?;

    let revenue_statuses: Vec<&str> = OrderStatus::ALL
        .iter()
        .filter(|s| s.counts_as_revenue())
        .map(|s| s.as_str())
        .collect();

    let (total_revenue, revenue_30d, orders_30d): (Decimal, Decimal, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(grand_total) FILTER (WHERE status = ANY($1)), 0) AS total_revenue,
               COALESCE(SUM(grand_total) FILTER (
                   WHERE status = ANY($1) AND placed_at >= NOW() - INTERVAL '30 days'), 0) AS revenue_30d,
               COUNT(*) FILTER (WHERE placed_at >= NOW() - INTERVAL '30 days') AS orders_30d
        FROM orders
        "#,
    )
    .bind(&revenue_statuses)
    .fetch_one(&state.db)
    .await?;

    let threshold = state.settings.low_stock_threshold;
    let low_stock = sqlx::query_as::<_, LowStockVariant>(
        r#"
        SELECT v.id AS variant_id, v.product_id, v.sku, v.name,
               COALESCE(SUM(i.quantity - i.reserved), 0)::bigint AS available
        FROM product_variants v
        LEFT JOIN inventory i ON i.variant_id = v.id
        WHERE v.is_active
        GROUP BY v.id
        HAVING COALESCE(SUM(i.quantity - i.reserved), 0) < $1
        ORDER BY available, v.sku
        LIMIT $2
        "#,
    )
    .bind(threshold)
    .bind(LOW_STOCK_LIMIT)
    .fetch_all(&state.db)
    .await?;

    let product_statuses: Vec<&'static str> = ProductStatus::ALL.iter().map(|s| s.as_str()).collect();
    let order_statuses: Vec<&'static str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();

    Ok(DashboardStats {
        products_by_status: fill_statuses(products, &product_statuses),
        total_customers,
        orders_by_status: fill_statuses(orders, &order_statuses),
        total_revenue,
        revenue_30d,
        orders_30d,
        low_stock_threshold: threshold,
        low_stock,
    })
}

/// GET /dashboard/stats
pub async fn get_dashboard_stats(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .cache
        .get_or_load(keys::dashboard_stats(), STATS_TTL, || compute_stats(&state))
        .await
        .scoped(Module::Dashboard, Operation::Get)?;
    Ok(DataResponse::new(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_statuses_count_as_zero() {
        let rows = vec![
            StatusCount {
                status: "archived".into(),
                count: 2,
            },
            StatusCount {
                status: "draft".into(),
                count: 5,
            },
        ];
        let filled = fill_statuses(rows, &["draft", "active", "archived"]);
        let counts: Vec<(&str, i64)> = filled.iter().map(|s| (s.status.as_str(), s.count)).collect();
        assert_eq!(counts, [("draft", 5), ("active", 0), ("archived", 2)]);
    }
}
