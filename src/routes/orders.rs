//! Order routes: admin-created orders, the status state machine and deletion

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, NoContent, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::orders::{
    CreateOrderRequest, OrderDetail, OrderItemInput, OrderItemResponse, OrderQuery,
    OrderResponse, OrderStatus, OrderStatusRequest,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::cache::keys;
use crate::services::{audit, pricing, references};

pub(crate) const ORDER_SELECT: &str = r#"
    SELECT o.id, o.order_number, o.customer_id, c.email AS customer_email, o.status, o.currency,
           o.subtotal, o.discount_total, o.shipping_total, o.tax_total, o.grand_total,
           o.shipping_address, o.notes, o.placed_at, o.updated_at
    FROM orders o
    JOIN customers c ON c.id = o.customer_id
"#;

pub(crate) const ORDER_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR o.status = $1)
      AND ($2::uuid IS NULL OR o.customer_id = $2)
      AND ($3::text IS NULL OR o.order_number ILIKE $3 OR c.email ILIKE $3)
      AND ($4::timestamptz IS NULL OR o.placed_at >= $4)
      AND ($5::timestamptz IS NULL OR o.placed_at < $5)
      AND ($6::numeric IS NULL OR o.grand_total >= $6)
      AND ($7::numeric IS NULL OR o.grand_total <= $7)
"#;

const SORTABLE: &[(&str, &str)] = &[("placed_at", "o.placed_at"), ("grand_total", "o.grand_total")];

/// Variant fields an order line snapshots
#[derive(Debug, Clone, FromRow)]
struct VariantPrice {
    id: Uuid,
    sku: String,
    name: String,
    price: Decimal,
    is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct PricedLine {
    variant_id: Uuid,
    sku: String,
    name: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

/// Price each requested line at the variant's current price.
fn price_lines(items: &[OrderItemInput], variants: &[VariantPrice]) -> ApiResult<Vec<PricedLine>> {
    let by_id: HashMap<Uuid, &VariantPrice> = variants.iter().map(|v| (v.id, v)).collect();

    items
        .iter()
        .map(|item| {
            let variant = by_id.get(&item.variant_id).ok_or_else(|| {
                ApiError::bad_request(format!("Variant {} does not exist", item.variant_id))
            })?;
            if !variant.is_active {
                return Err(ApiError::unprocessable(format!(
                    "Variant {} is inactive and cannot be ordered",
                    variant.sku
                )));
            }
            Ok(PricedLine {
                variant_id: variant.id,
                sku: variant.sku.clone(),
                name: variant.name.clone(),
                quantity: item.quantity,
                unit_price: variant.price,
                line_total: pricing::line_total(variant.price, item.quantity),
            })
        })
        .collect()
}

async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<OrderDetail> {
    let order = sqlx::query_as::<_, OrderResponse>(&format!("{ORDER_SELECT} WHERE o.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let items = sqlx::query_as::<_, OrderItemResponse>(
        r#"
        SELECT id, variant_id, sku, name, quantity, unit_price, line_total
        FROM order_items
        WHERE order_id = $1
        ORDER BY sku, id
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(OrderDetail { order, items })
}

/// GET /orders
pub async fn list_orders(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Orders;
    let pattern = like_pattern(query.q.as_deref());
    let status = query.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM orders o JOIN customers c ON c.id = o.customer_id {ORDER_FILTER}"
    ))
    .bind(status)
    .bind(query.customer_id)
    .bind(&pattern)
    .bind(query.placed_from)
    .bind(query.placed_to)
    .bind(query.min_total)
    .bind(query.max_total)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "o.placed_at");
    let orders = sqlx::query_as::<_, OrderResponse>(&format!(
        "{ORDER_SELECT} {ORDER_FILTER} ORDER BY {order_by}, o.id LIMIT $8 OFFSET $9"
    ))
    .bind(status)
    .bind(query.customer_id)
    .bind(&pattern)
    .bind(query.placed_from)
    .bind(query.placed_to)
    .bind(query.min_total)
    .bind(query.max_total)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(orders, &query.pagination, total))
}

/// GET /orders/:id
pub async fn get_order(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = load_detail(&state, id).await.scoped(Module::Orders, Operation::Get)?;
    Ok(DataResponse::new(detail))
}

/// POST /orders
///
/// Lines are priced from the variants at creation time and never repriced.
pub async fn create_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Orders;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Create)?;

    let customer_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1)")
            .bind(req.customer_id)
            .fetch_one(&mut *tx)
            .await
            .scoped(m, Operation::Create)?;
    if !customer_exists {
        return Err(ApiError::bad_request(format!(
            "Customer {} does not exist",
            req.customer_id
        ))
        .in_scope(m, Operation::Create));
    }

    let variant_ids: Vec<Uuid> = req.items.iter().map(|i| i.variant_id).collect();
    let variants = sqlx::query_as::<_, VariantPrice>(
        "SELECT id, sku, name, price, is_active FROM product_variants WHERE id = ANY($1)",
    )
    .bind(&variant_ids)
    .fetch_all(&mut *tx)
    .await
    .scoped(m, Operation::Create)?;

    let lines = price_lines(&req.items, &variants).scoped(m, Operation::Create)?;
    let line_totals: Vec<Decimal> = lines.iter().map(|l| l.line_total).collect();
    let totals = pricing::order_totals(
        &line_totals,
        req.discount_total,
        req.shipping_total,
        req.tax_total,
    )
    .map_err(|e| ApiError::unprocessable(e.to_string()).in_scope(m, Operation::Create))?;

    let id = Uuid::new_v4();
    let placed_at = Utc::now();
    let order_number = references::order_number(placed_at);

    sqlx::query(
        r#"
        INSERT INTO orders (id, order_number, customer_id, currency, subtotal, discount_total,
                            shipping_total, tax_total, grand_total, shipping_address, notes, placed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(id)
    .bind(&order_number)
    .bind(req.customer_id)
    .bind(&req.currency)
    .bind(totals.subtotal)
    .bind(totals.discount_total)
    .bind(totals.shipping_total)
    .bind(totals.tax_total)
    .bind(totals.grand_total)
    .bind(req.shipping_address.clone().map(sqlx::types::Json))
    .bind(&req.notes)
    .bind(placed_at)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Create)?;

    for line in &lines {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, variant_id, sku, name, quantity, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(line.variant_id)
        .bind(&line.sku)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.line_total)
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Create)?;
    }
    tx.commit().await.scoped(m, Operation::Create)?;

    state.cache.invalidate(keys::dashboard_stats()).await;
    info!(admin_id = %auth.user_id, order_id = %id, %order_number, grand_total = %totals.grand_total, "Order created");

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Order,
        Some(id),
        serde_json::json!({
            "order_number": order_number,
            "customer_id": req.customer_id,
            "grand_total": totals.grand_total,
        }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(detail))
}

/// POST /orders/:id/status
pub async fn set_order_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<OrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Orders;
    auth.ensure_can_write().scoped(m, Operation::Transition)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Transition)?;
    let current: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .scoped(m, Operation::Transition)?
        .ok_or_else(|| ApiError::not_found("Order not found").in_scope(m, Operation::Transition))?;
    let current: OrderStatus = current
        .parse()
        .map_err(|e: String| ApiError::internal(e).in_scope(m, Operation::Transition))?;

    if !current.can_transition_to(req.status) {
        return Err(ApiError::unprocessable(format!(
            "Cannot change order status from {current} to {}",
            req.status
        ))
        .in_scope(m, Operation::Transition));
    }

    sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(req.status.as_str())
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Transition)?;
    tx.commit().await.scoped(m, Operation::Transition)?;

    state.cache.invalidate(keys::dashboard_stats()).await;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::StatusChange,
        AuditTargetType::Order,
        Some(id),
        serde_json::json!({ "from": current, "to": req.status }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Transition)?;
    Ok(DataResponse::new(detail))
}

/// DELETE /orders/:id
///
/// Only pending or cancelled orders can be removed.
pub async fn delete_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Orders;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Delete)?;
    if !detail.order.status.is_deletable() {
        return Err(ApiError::unprocessable(format!(
            "Order is {}; only pending or cancelled orders can be deleted",
            detail.order.status
        ))
        .in_scope(m, Operation::Delete));
    }

    // Guard on the status read above so a concurrent payment is not lost
    let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND status = $2")
        .bind(id)
        .bind(detail.order.status.as_str())
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Order changed concurrently; reload and retry")
            .in_scope(m, Operation::Delete));
    }

    state.cache.invalidate(keys::dashboard_stats()).await;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Order,
        Some(id),
        serde_json::json!({ "order_number": detail.order.order_number }),
    )
    .await;

    Ok(NoContent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn variant(sku: &str, price: Decimal, is_active: bool) -> VariantPrice {
        VariantPrice {
            id: Uuid::new_v4(),
            sku: sku.to_string(),
            name: format!("{sku} name"),
            price,
            is_active,
        }
    }

    #[test]
    fn lines_snapshot_variant_prices() {
        let mug = variant("MUG-1", dec!(12.50), true);
        let cup = variant("CUP-1", dec!(3.333), true);
        let items = vec![
            OrderItemInput {
                variant_id: mug.id,
                quantity: 2,
            },
            OrderItemInput {
                variant_id: cup.id,
                quantity: 3,
            },
        ];

        let lines = price_lines(&items, &[mug.clone(), cup]).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].sku, "MUG-1");
        assert_eq!(lines[0].unit_price, dec!(12.50));
        assert_eq!(lines[0].line_total, dec!(25.00));
        assert_eq!(lines[1].line_total, dec!(10.00));
    }

    #[test]
    fn unknown_and_inactive_variants_are_rejected() {
        let retired = variant("OLD-1", dec!(5), false);
        let unknown = OrderItemInput {
            variant_id: Uuid::new_v4(),
            quantity: 1,
        };
        let err = price_lines(&[unknown], &[retired.clone()]).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");

        let inactive = OrderItemInput {
            variant_id: retired.id,
            quantity: 1,
        };
        let err = price_lines(&[inactive], &[retired]).unwrap_err();
        assert_eq!(err.error_code(), "UNPROCESSABLE_ENTITY");
    }
}
