//! Customer routes and wishlists

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, NoContent, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::customers::{
    normalize_email, AddWishlistItemRequest, CreateCustomerRequest, CustomerQuery,
    CustomerResponse, UpdateCustomerRequest, WishlistItemResponse,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::audit;

pub(crate) const CUSTOMER_SELECT: &str = r#"
    SELECT c.id, c.email, c.first_name, c.last_name, c.phone, c.is_active,
           (SELECT COUNT(*) FROM orders o WHERE o.customer_id = c.id) AS order_count,
           COALESCE((SELECT SUM(o.grand_total) FROM orders o
                     WHERE o.customer_id = c.id AND o.status <> 'cancelled'), 0) AS lifetime_value,
           c.created_at, c.updated_at
    FROM customers c
"#;

const SORTABLE: &[(&str, &str)] = &[
    ("email", "c.email"),
    ("last_name", "LOWER(c.last_name)"),
    ("created_at", "c.created_at"),
];

async fn fetch_customer(state: &AppState, id: Uuid) -> ApiResult<CustomerResponse> {
    sqlx::query_as::<_, CustomerResponse>(&format!("{CUSTOMER_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found"))
}

/// GET /customers
pub async fn list_customers(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Customers;
    let pattern = like_pattern(query.q.as_deref());
    let filter = r#"
        WHERE ($1::text IS NULL OR c.email ILIKE $1 OR c.first_name ILIKE $1 OR c.last_name ILIKE $1
               OR (c.first_name || ' ' || c.last_name) ILIKE $1)
          AND ($2::bool IS NULL OR c.is_active = $2)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM customers c {filter}"))
        .bind(&pattern)
        .bind(query.is_active)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "c.created_at");
    let customers = sqlx::query_as::<_, CustomerResponse>(&format!(
        "{CUSTOMER_SELECT} {filter} ORDER BY {order_by}, c.id LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(query.is_active)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(customers, &query.pagination, total))
}

/// GET /customers/:id
pub async fn get_customer(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = fetch_customer(&state, id)
        .await
        .scoped(Module::Customers, Operation::Get)?;
    Ok(DataResponse::new(customer))
}

/// POST /customers
pub async fn create_customer(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Customers;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let id = Uuid::new_v4();
    let email = normalize_email(&req.email);

    sqlx::query(
        r#"
        INSERT INTO customers (id, email, first_name, last_name, phone, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(&email)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&req.phone)
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Customer,
        Some(id),
        serde_json::json!({ "email": email }),
    )
    .await;

    let customer = fetch_customer(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(customer))
}

/// PATCH /customers/:id
pub async fn update_customer(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Customers;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let email = req.email.as_deref().map(normalize_email);
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            phone = COALESCE($5, phone),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&email)
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .scoped(m, Operation::Update)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Customer not found").in_scope(m, Operation::Update));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Customer,
        Some(id),
        serde_json::json!({ "email": email, "is_active": req.is_active }),
    )
    .await;

    let customer = fetch_customer(&state, id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(customer))
}

/// DELETE /customers/:id
///
/// Customers with orders are kept for the order history; deactivate them instead.
pub async fn delete_customer(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Customers;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let customer = fetch_customer(&state, id).await.scoped(m, Operation::Delete)?;
    if customer.order_count > 0 {
        return Err(ApiError::conflict(format!(
            "Customer has {} orders; deactivate the customer instead",
            customer.order_count
        ))
        .in_scope(m, Operation::Delete));
    }

    sqlx::query("DELETE FROM customers WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Customer,
        Some(id),
        serde_json::json!({ "email": customer.email }),
    )
    .await;

    Ok(NoContent)
}

// ============================================================================
// Wishlist
// ============================================================================

async fn ensure_customer_exists(state: &AppState, id: Uuid) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found("Customer not found"))
    }
}

async fn wishlist_for(state: &AppState, customer_id: Uuid) -> ApiResult<Vec<WishlistItemResponse>> {
    let items = sqlx::query_as::<_, WishlistItemResponse>(
        r#"
        SELECT w.product_id, p.name AS product_name, p.sku, p.base_price, w.added_at
        FROM wishlist_items w
        JOIN products p ON p.id = w.product_id
        WHERE w.customer_id = $1
        ORDER BY w.added_at DESC
        "#,
    )
    .bind(customer_id)
    .fetch_all(&state.db)
    .await?;
    Ok(items)
}

/// GET /customers/:id/wishlist
pub async fn get_wishlist(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Wishlists;
    ensure_customer_exists(&state, id).await.scoped(m, Operation::List)?;
    let items = wishlist_for(&state, id).await.scoped(m, Operation::List)?;
    Ok(DataResponse::new(items))
}

/// POST /customers/:id/wishlist
///
/// Adding a product that is already on the list is a no-op.
pub async fn add_to_wishlist(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AddWishlistItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Wishlists;
    auth.ensure_can_write().scoped(m, Operation::Create)?;
    ensure_customer_exists(&state, id).await.scoped(m, Operation::Create)?;

    let product_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(req.product_id)
            .fetch_one(&state.db)
            .await
            .scoped(m, Operation::Create)?;
    if !product_exists {
        return Err(ApiError::bad_request(format!("Product {} does not exist", req.product_id))
            .in_scope(m, Operation::Create));
    }

    let inserted = sqlx::query(
        "INSERT INTO wishlist_items (customer_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(req.product_id)
    .execute(&state.db)
    .await
    .scoped(m, Operation::Create)?
    .rows_affected()
        > 0;

    if inserted {
        audit::record(
            &state.db,
            auth.user_id,
            AdminAction::Create,
            AuditTargetType::Wishlist,
            Some(id),
            serde_json::json!({ "product_id": req.product_id }),
        )
        .await;
    }

    let items = wishlist_for(&state, id).await.scoped(m, Operation::Create)?;
    Ok(DataResponse::new(items))
}

/// DELETE /customers/:id/wishlist/:product_id
pub async fn remove_from_wishlist(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Wishlists;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result =
        sqlx::query("DELETE FROM wishlist_items WHERE customer_id = $1 AND product_id = $2")
            .bind(id)
            .bind(product_id)
            .execute(&state.db)
            .await
            .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product is not on this wishlist")
            .in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Wishlist,
        Some(id),
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(NoContent)
}
