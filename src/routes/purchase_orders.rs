//! Purchase order routes: drafting, state transitions and receiving stock

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgConnection;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::variants::ensure_variants_exist;
use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::purchase_orders::{
    CreatePurchaseOrderRequest, PurchaseOrderDetail, PurchaseOrderItemInput,
    PurchaseOrderItemResponse, PurchaseOrderQuery, PurchaseOrderResponse, PurchaseOrderStatus,
    PurchaseOrderStatusRequest, UpdatePurchaseOrderRequest,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::{audit, references};

const PO_SELECT: &str = r#"
    SELECT po.id, po.reference, po.supplier_name, po.warehouse_id, w.code AS warehouse_code,
           po.status, po.notes, po.expected_at, po.received_at,
           (SELECT COUNT(*) FROM purchase_order_items i WHERE i.purchase_order_id = po.id) AS item_count,
           COALESCE((SELECT SUM(i.quantity * i.unit_cost) FROM purchase_order_items i
                     WHERE i.purchase_order_id = po.id), 0) AS total_cost,
           po.created_at, po.updated_at
    FROM purchase_orders po
    JOIN warehouses w ON w.id = po.warehouse_id
"#;

const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "po.created_at"),
    ("expected_at", "po.expected_at"),
    ("supplier_name", "LOWER(po.supplier_name)"),
];

async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<PurchaseOrderDetail> {
    let order = sqlx::query_as::<_, PurchaseOrderResponse>(&format!("{PO_SELECT} WHERE po.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Purchase order not found"))?;

    let items = sqlx::query_as::<_, PurchaseOrderItemResponse>(
        r#"
        SELECT i.id, i.variant_id, v.sku, v.name AS variant_name, i.quantity, i.unit_cost,
               (i.quantity * i.unit_cost) AS line_cost
        FROM purchase_order_items i
        JOIN product_variants v ON v.id = i.variant_id
        WHERE i.purchase_order_id = $1
        ORDER BY v.sku
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(PurchaseOrderDetail { order, items })
}

async fn insert_items(
    conn: &mut PgConnection,
    purchase_order_id: Uuid,
    items: &[PurchaseOrderItemInput],
) -> Result<(), sqlx::Error> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (id, purchase_order_id, variant_id, quantity, unit_cost)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(purchase_order_id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(item.unit_cost)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn lock_status(conn: &mut PgConnection, id: Uuid) -> ApiResult<PurchaseOrderStatus> {
    let status: String =
        sqlx::query_scalar("SELECT status FROM purchase_orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::not_found("Purchase order not found"))?;
    status.parse().map_err(ApiError::internal)
}

/// GET /purchase-orders
pub async fn list_purchase_orders(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PurchaseOrderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::PurchaseOrders;
    let supplier = like_pattern(query.supplier.as_deref());
    let status = query.status.map(|s| s.as_str());
    let filter = r#"
        WHERE ($1::text IS NULL OR po.status = $1)
          AND ($2::uuid IS NULL OR po.warehouse_id = $2)
          AND ($3::text IS NULL OR po.supplier_name ILIKE $3)
    "#;

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM purchase_orders po {filter}"))
            .bind(status)
            .bind(query.warehouse_id)
            .bind(&supplier)
            .fetch_one(&state.db)
            .await
            .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "po.created_at");
    let orders = sqlx::query_as::<_, PurchaseOrderResponse>(&format!(
        "{PO_SELECT} {filter} ORDER BY {order_by}, po.id LIMIT $4 OFFSET $5"
    ))
    .bind(status)
    .bind(query.warehouse_id)
    .bind(&supplier)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(orders, &query.pagination, total))
}

/// GET /purchase-orders/:id
pub async fn get_purchase_order(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = load_detail(&state, id)
        .await
        .scoped(Module::PurchaseOrders, Operation::Get)?;
    Ok(DataResponse::new(detail))
}

/// POST /purchase-orders
pub async fn create_purchase_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::PurchaseOrders;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let warehouse_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
            .bind(req.warehouse_id)
            .fetch_one(&state.db)
            .await
            .scoped(m, Operation::Create)?;
    if !warehouse_exists {
        return Err(ApiError::bad_request(format!(
            "Warehouse {} does not exist",
            req.warehouse_id
        ))
        .in_scope(m, Operation::Create));
    }
    let variant_ids: Vec<Uuid> = req.items.iter().map(|i| i.variant_id).collect();
    ensure_variants_exist(&state, &variant_ids)
        .await
        .scoped(m, Operation::Create)?;

    let id = Uuid::new_v4();
    let reference = match req.reference.as_deref().map(str::trim) {
        Some(reference) if !reference.is_empty() => reference.to_string(),
        _ => references::purchase_order_reference(Utc::now()),
    };

    let mut tx = state.db.begin().await.scoped(m, Operation::Create)?;
    sqlx::query(
        r#"
        INSERT INTO purchase_orders (id, reference, supplier_name, warehouse_id, notes, expected_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(&reference)
    .bind(req.supplier_name.trim())
    .bind(req.warehouse_id)
    .bind(&req.notes)
    .bind(req.expected_at)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Create)?;
    insert_items(&mut tx, id, &req.items)
        .await
        .scoped(m, Operation::Create)?;
    tx.commit().await.scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::PurchaseOrder,
        Some(id),
        serde_json::json!({ "reference": reference, "items": req.items.len() }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(detail))
}

/// PATCH /purchase-orders/:id
///
/// Drafts only; `items` replaces the full item list.
pub async fn update_purchase_order(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::PurchaseOrders;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    if let Some(items) = &req.items {
        let variant_ids: Vec<Uuid> = items.iter().map(|i| i.variant_id).collect();
        ensure_variants_exist(&state, &variant_ids)
            .await
            .scoped(m, Operation::Update)?;
    }

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    let status = lock_status(&mut tx, id).await.scoped(m, Operation::Update)?;
    if !status.is_editable() {
        return Err(ApiError::unprocessable(format!(
            "Purchase order is {status}; only drafts can be edited"
        ))
        .in_scope(m, Operation::Update));
    }

    sqlx::query(
        r#"
        UPDATE purchase_orders SET
            supplier_name = COALESCE($2, supplier_name),
            notes = COALESCE($3, notes),
            expected_at = COALESCE($4, expected_at),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.supplier_name.as_deref().map(str::trim))
    .bind(&req.notes)
    .bind(req.expected_at)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;

    if let Some(items) = &req.items {
        sqlx::query("DELETE FROM purchase_order_items WHERE purchase_order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .scoped(m, Operation::Update)?;
        insert_items(&mut tx, id, items)
            .await
            .scoped(m, Operation::Update)?;
    }
    tx.commit().await.scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::PurchaseOrder,
        Some(id),
        serde_json::json!({
            "supplier_name": req.supplier_name,
            "items_replaced": req.items.as_ref().map(Vec::len),
        }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(detail))
}

/// POST /purchase-orders/:id/status
///
/// Moving to `received` books every item into the order's warehouse. The
/// order row stays locked until commit, so a second receive sees the new status.
pub async fn set_purchase_order_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PurchaseOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::PurchaseOrders;
    auth.ensure_can_write().scoped(m, Operation::Transition)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Transition)?;
    let current = lock_status(&mut tx, id).await.scoped(m, Operation::Transition)?;
    if !current.can_transition_to(req.status) {
        return Err(ApiError::unprocessable(format!(
            "Cannot change purchase order status from {current} to {}",
            req.status
        ))
        .in_scope(m, Operation::Transition));
    }

    let mut units_received: i64 = 0;
    if req.status == PurchaseOrderStatus::Received {
        units_received = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::bigint FROM purchase_order_items WHERE purchase_order_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .scoped(m, Operation::Transition)?;

        let overflowing: Option<String> = sqlx::query_scalar(
            r#"
            SELECT v.sku
            FROM purchase_order_items i
            JOIN purchase_orders po ON po.id = i.purchase_order_id
            JOIN product_variants v ON v.id = i.variant_id
            JOIN inventory inv ON inv.warehouse_id = po.warehouse_id AND inv.variant_id = i.variant_id
            WHERE i.purchase_order_id = $1
              AND inv.quantity::bigint + i.quantity > $2
            LIMIT 1
            "#,
        )
        .bind(id)
        .bind(i64::from(i32::MAX))
        .fetch_optional(&mut *tx)
        .await
        .scoped(m, Operation::Transition)?;
        if let Some(sku) = overflowing {
            return Err(ApiError::unprocessable(format!(
                "Receiving would push stock of {sku} past the largest storable level"
            ))
            .in_scope(m, Operation::Transition));
        }

        sqlx::query(
            r#"
            INSERT INTO inventory (warehouse_id, variant_id, quantity)
            SELECT po.warehouse_id, i.variant_id, i.quantity
            FROM purchase_order_items i
            JOIN purchase_orders po ON po.id = i.purchase_order_id
            WHERE i.purchase_order_id = $1
            ON CONFLICT (warehouse_id, variant_id) DO UPDATE
            SET quantity = inventory.quantity + EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Transition)?;
    }

    sqlx::query(
        r#"
        UPDATE purchase_orders SET
            status = $2,
            received_at = CASE WHEN $2 = 'received' THEN NOW() ELSE received_at END,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.status.as_str())
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Transition)?;
    tx.commit().await.scoped(m, Operation::Transition)?;

    let action = if req.status == PurchaseOrderStatus::Received {
        info!(admin_id = %auth.user_id, purchase_order_id = %id, units_received, "Purchase order received");
        AdminAction::Receive
    } else {
        AdminAction::StatusChange
    };
    audit::record(
        &state.db,
        auth.user_id,
        action,
        AuditTargetType::PurchaseOrder,
        Some(id),
        serde_json::json!({ "from": current, "to": req.status, "units_received": units_received }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Transition)?;
    Ok(DataResponse::new(detail))
}
