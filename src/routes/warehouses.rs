//! Warehouse routes and per-warehouse stock management

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, NoContent, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::inventory::{
    apply_stock_delta, AdjustStockRequest, CreateWarehouseRequest, InventoryLevel, InventoryQuery,
    UpdateWarehouseRequest, WarehouseQuery, WarehouseResponse,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::audit;

const WAREHOUSE_COLUMNS: &str =
    "id, code, name, address, city, country, is_active, created_at, updated_at";

const INVENTORY_SELECT: &str = r#"
    SELECT i.warehouse_id, i.variant_id, v.sku, v.name AS variant_name, v.product_id,
           i.quantity, i.reserved, (i.quantity - i.reserved) AS available, i.updated_at
    FROM inventory i
    JOIN product_variants v ON v.id = i.variant_id
"#;

const SORTABLE: &[(&str, &str)] = &[
    ("code", "code"),
    ("name", "LOWER(name)"),
    ("created_at", "created_at"),
];

async fn fetch_warehouse(state: &AppState, id: Uuid) -> ApiResult<WarehouseResponse> {
    sqlx::query_as::<_, WarehouseResponse>(&format!(
        "SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Warehouse not found"))
}

fn country_code(country: Option<&str>) -> Option<String> {
    country.map(|c| c.trim().to_ascii_uppercase())
}

/// GET /warehouses
pub async fn list_warehouses(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WarehouseQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Warehouses;
    let pattern = like_pattern(query.q.as_deref());
    let filter = "WHERE ($1::text IS NULL OR name ILIKE $1 OR code ILIKE $1) AND ($2::bool IS NULL OR is_active = $2)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM warehouses {filter}"))
        .bind(&pattern)
        .bind(query.is_active)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "code");
    let warehouses = sqlx::query_as::<_, WarehouseResponse>(&format!(
        "SELECT {WAREHOUSE_COLUMNS} FROM warehouses {filter} ORDER BY {order_by}, id LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(query.is_active)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(warehouses, &query.pagination, total))
}

/// GET /warehouses/:id
pub async fn get_warehouse(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let warehouse = fetch_warehouse(&state, id)
        .await
        .scoped(Module::Warehouses, Operation::Get)?;
    Ok(DataResponse::new(warehouse))
}

/// POST /warehouses
pub async fn create_warehouse(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateWarehouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Warehouses;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let warehouse = sqlx::query_as::<_, WarehouseResponse>(&format!(
        r#"
        INSERT INTO warehouses (id, code, name, address, city, country, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {WAREHOUSE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&req.code)
    .bind(req.name.trim())
    .bind(&req.address)
    .bind(&req.city)
    .bind(country_code(req.country.as_deref()))
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Warehouse,
        Some(warehouse.id),
        serde_json::json!({ "code": warehouse.code }),
    )
    .await;

    Ok(Created(warehouse))
}

/// PATCH /warehouses/:id
pub async fn update_warehouse(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateWarehouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Warehouses;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let warehouse = sqlx::query_as::<_, WarehouseResponse>(&format!(
        r#"
        UPDATE warehouses SET
            code = COALESCE($2, code),
            name = COALESCE($3, name),
            address = COALESCE($4, address),
            city = COALESCE($5, city),
            country = COALESCE($6, country),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {WAREHOUSE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&req.code)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.address)
    .bind(&req.city)
    .bind(country_code(req.country.as_deref()))
    .bind(req.is_active)
    .fetch_optional(&state.db)
    .await
    .scoped(m, Operation::Update)?
    .ok_or_else(|| ApiError::not_found("Warehouse not found").in_scope(m, Operation::Update))?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Warehouse,
        Some(id),
        serde_json::json!({ "code": req.code, "name": req.name, "is_active": req.is_active }),
    )
    .await;

    Ok(DataResponse::new(warehouse))
}

/// DELETE /warehouses/:id
///
/// Stock rows go with the warehouse; purchase orders still pointing at it block the delete (409).
pub async fn delete_warehouse(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Warehouses;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result = sqlx::query("DELETE FROM warehouses WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Warehouse not found").in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Warehouse,
        Some(id),
        serde_json::json!({}),
    )
    .await;

    Ok(NoContent)
}

/// GET /warehouses/:id/inventory
pub async fn list_inventory(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<InventoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Inventory;
    fetch_warehouse(&state, id).await.scoped(m, Operation::List)?;

    let pattern = like_pattern(query.q.as_deref());
    let filter = r#"
        WHERE i.warehouse_id = $1
          AND ($2::text IS NULL OR v.sku ILIKE $2 OR v.name ILIKE $2)
          AND ($3::int IS NULL OR (i.quantity - i.reserved) <= $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM inventory i JOIN product_variants v ON v.id = i.variant_id {filter}"
    ))
    .bind(id)
    .bind(&pattern)
    .bind(query.max_available)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::List)?;

    let levels = sqlx::query_as::<_, InventoryLevel>(&format!(
        "{INVENTORY_SELECT} {filter} ORDER BY v.sku LIMIT $4 OFFSET $5"
    ))
    .bind(id)
    .bind(&pattern)
    .bind(query.max_available)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(levels, &query.pagination, total))
}

/// POST /warehouses/:id/inventory/adjust
///
/// Applies a signed delta to one variant's stock, creating the row on first use.
pub async fn adjust_inventory(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AdjustStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Inventory;
    auth.ensure_can_write().scoped(m, Operation::Update)?;
    fetch_warehouse(&state, id).await.scoped(m, Operation::Update)?;

    let variant_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM product_variants WHERE id = $1)")
            .bind(req.variant_id)
            .fetch_one(&state.db)
            .await
            .scoped(m, Operation::Update)?;
    if !variant_exists {
        return Err(ApiError::bad_request(format!("Variant {} does not exist", req.variant_id))
            .in_scope(m, Operation::Update));
    }

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    sqlx::query(
        "INSERT INTO inventory (warehouse_id, variant_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(req.variant_id)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;

    let (quantity, reserved): (i32, i32) = sqlx::query_as(
        "SELECT quantity, reserved FROM inventory WHERE warehouse_id = $1 AND variant_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(req.variant_id)
    .fetch_one(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;

    let resulting = apply_stock_delta(quantity, reserved, req.delta)
        .map_err(|e| ApiError::unprocessable(e.to_string()).in_scope(m, Operation::Update))?;

    sqlx::query(
        "UPDATE inventory SET quantity = $3, updated_at = NOW() WHERE warehouse_id = $1 AND variant_id = $2",
    )
    .bind(id)
    .bind(req.variant_id)
    .bind(resulting)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;
    tx.commit().await.scoped(m, Operation::Update)?;

    info!(
        admin_id = %auth.user_id,
        warehouse_id = %id,
        variant_id = %req.variant_id,
        delta = req.delta,
        quantity = resulting,
        "Stock adjusted"
    );

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::StockAdjust,
        AuditTargetType::Inventory,
        Some(req.variant_id),
        serde_json::json!({
            "warehouse_id": id,
            "delta": req.delta,
            "from": quantity,
            "to": resulting,
            "reason": req.reason,
        }),
    )
    .await;

    let level = sqlx::query_as::<_, InventoryLevel>(&format!(
        "{INVENTORY_SELECT} WHERE i.warehouse_id = $1 AND i.variant_id = $2"
    ))
    .bind(id)
    .bind(req.variant_id)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Update)?;

    Ok(DataResponse::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_are_uppercased() {
        assert_eq!(country_code(Some(" de ")), Some("DE".to_string()));
        assert_eq!(country_code(None), None);
    }
}
