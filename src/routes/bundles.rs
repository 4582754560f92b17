//! Bundle routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use super::variants::ensure_variants_exist;
use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, NoContent, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::bundles::{
    BundleDetail, BundleItemInput, BundleItemResponse, BundleQuery, BundleResponse,
    CreateBundleRequest, UpdateBundleRequest,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::{audit, pricing, slug};

const BUNDLE_SELECT: &str = r#"
    SELECT b.id, b.name, b.slug, b.description, b.discount_percent, b.is_active,
           (SELECT COUNT(*) FROM bundle_items bi WHERE bi.bundle_id = b.id) AS item_count,
           b.created_at, b.updated_at
    FROM bundles b
"#;

const SORTABLE: &[(&str, &str)] = &[("name", "LOWER(b.name)"), ("created_at", "b.created_at")];

async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<BundleDetail> {
    let bundle = sqlx::query_as::<_, BundleResponse>(&format!("{BUNDLE_SELECT} WHERE b.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Bundle not found"))?;

    let items = sqlx::query_as::<_, BundleItemResponse>(
        r#"
        SELECT bi.variant_id, v.product_id, v.sku, v.name AS variant_name,
               v.price AS unit_price, bi.quantity
        FROM bundle_items bi
        JOIN product_variants v ON v.id = bi.variant_id
        WHERE bi.bundle_id = $1
        ORDER BY bi.position
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let priced: Vec<_> = items.iter().map(|i| (i.unit_price, i.quantity)).collect();
    let pricing = pricing::bundle_pricing(&priced, bundle.discount_percent);

    Ok(BundleDetail {
        bundle,
        items,
        pricing,
    })
}

async fn replace_items(
    conn: &mut PgConnection,
    bundle_id: Uuid,
    items: &[BundleItemInput],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM bundle_items WHERE bundle_id = $1")
        .bind(bundle_id)
        .execute(&mut *conn)
        .await?;
    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO bundle_items (bundle_id, variant_id, quantity, position) VALUES ($1, $2, $3, $4)",
        )
        .bind(bundle_id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// GET /bundles
pub async fn list_bundles(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BundleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Bundles;
    let pattern = like_pattern(query.q.as_deref());
    let filter = "WHERE ($1::text IS NULL OR b.name ILIKE $1) AND ($2::bool IS NULL OR b.is_active = $2)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM bundles b {filter}"))
        .bind(&pattern)
        .bind(query.is_active)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "b.created_at");
    let bundles = sqlx::query_as::<_, BundleResponse>(&format!(
        "{BUNDLE_SELECT} {filter} ORDER BY {order_by}, b.id LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(query.is_active)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(bundles, &query.pagination, total))
}

/// GET /bundles/:id
///
/// Includes the items and the priced view at current variant prices.
pub async fn get_bundle(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = load_detail(&state, id).await.scoped(Module::Bundles, Operation::Get)?;
    Ok(DataResponse::new(detail))
}

/// POST /bundles
pub async fn create_bundle(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateBundleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Bundles;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let variant_ids: Vec<Uuid> = req.items.iter().map(|i| i.variant_id).collect();
    ensure_variants_exist(&state, &variant_ids)
        .await
        .scoped(m, Operation::Create)?;

    let id = Uuid::new_v4();
    let slug = slug::resolve(req.slug.as_deref(), &req.name);

    let mut tx = state.db.begin().await.scoped(m, Operation::Create)?;
    sqlx::query(
        r#"
        INSERT INTO bundles (id, name, slug, description, discount_percent, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(req.name.trim())
    .bind(&slug)
    .bind(&req.description)
    .bind(req.discount_percent)
    .bind(req.is_active)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Create)?;
    replace_items(&mut tx, id, &req.items)
        .await
        .scoped(m, Operation::Create)?;
    tx.commit().await.scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Bundle,
        Some(id),
        serde_json::json!({ "name": req.name, "items": req.items.len() }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(detail))
}

/// PATCH /bundles/:id
pub async fn update_bundle(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateBundleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Bundles;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    if let Some(items) = &req.items {
        let variant_ids: Vec<Uuid> = items.iter().map(|i| i.variant_id).collect();
        ensure_variants_exist(&state, &variant_ids)
            .await
            .scoped(m, Operation::Update)?;
    }

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    let result = sqlx::query(
        r#"
        UPDATE bundles SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description),
            discount_percent = COALESCE($5, discount_percent),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.slug)
    .bind(&req.description)
    .bind(req.discount_percent)
    .bind(req.is_active)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Bundle not found").in_scope(m, Operation::Update));
    }

    if let Some(items) = &req.items {
        replace_items(&mut tx, id, items)
            .await
            .scoped(m, Operation::Update)?;
    }
    tx.commit().await.scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Bundle,
        Some(id),
        serde_json::json!({
            "name": req.name,
            "discount_percent": req.discount_percent,
            "items_replaced": req.items.as_ref().map(Vec::len),
        }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(detail))
}

/// DELETE /bundles/:id
pub async fn delete_bundle(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Bundles;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result = sqlx::query("DELETE FROM bundles WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Bundle not found").in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Bundle,
        Some(id),
        serde_json::json!({}),
    )
    .await;

    Ok(NoContent)
}
