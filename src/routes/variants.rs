//! Product variant routes and the cross-warehouse stock view

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use super::products::ensure_product_exists;
use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::inventory::StockSummary;
use crate::domain::products::{CreateVariantRequest, UpdateVariantRequest, VariantResponse};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::audit;

pub(crate) const VARIANT_COLUMNS: &str =
    "id, product_id, sku, name, price, weight_grams, is_active, created_at, updated_at";

async fn fetch_variant(state: &AppState, product_id: Uuid, id: Uuid) -> ApiResult<VariantResponse> {
    sqlx::query_as::<_, VariantResponse>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1 AND product_id = $2"
    ))
    .bind(id)
    .bind(product_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Variant not found"))
}

/// 400 naming any of `ids` that is not a known variant
pub(crate) async fn ensure_variants_exist(state: &AppState, ids: &[Uuid]) -> ApiResult<()> {
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM product_variants WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&state.db)
        .await?;
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains(id))
        .map(Uuid::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Unknown variant ids: {}",
            missing.join(", ")
        )))
    }
}

/// GET /products/:id/variants
pub async fn list_variants(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Variants;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::List)?;

    let variants = sqlx::query_as::<_, VariantResponse>(&format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = $1 ORDER BY created_at, sku"
    ))
    .bind(product_id)
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(DataResponse::new(variants))
}

/// POST /products/:id/variants
pub async fn create_variant(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateVariantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Variants;
    auth.ensure_can_write().scoped(m, Operation::Create)?;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::Create)?;

    let variant = sqlx::query_as::<_, VariantResponse>(&format!(
        r#"
        INSERT INTO product_variants (id, product_id, sku, name, price, weight_grams, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {VARIANT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(req.sku.trim())
    .bind(req.name.trim())
    .bind(req.price)
    .bind(req.weight_grams)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Variant,
        Some(variant.id),
        serde_json::json!({ "product_id": product_id, "sku": variant.sku }),
    )
    .await;

    Ok(Created(variant))
}

/// PATCH /products/:id/variants/:variant_id
pub async fn update_variant(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((product_id, id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateVariantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Variants;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let variant = sqlx::query_as::<_, VariantResponse>(&format!(
        r#"
        UPDATE product_variants SET
            sku = COALESCE($3, sku),
            name = COALESCE($4, name),
            price = COALESCE($5, price),
            weight_grams = COALESCE($6, weight_grams),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1 AND product_id = $2
        RETURNING {VARIANT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(product_id)
    .bind(req.sku.as_deref().map(str::trim))
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.price)
    .bind(req.weight_grams)
    .bind(req.is_active)
    .fetch_optional(&state.db)
    .await
    .scoped(m, Operation::Update)?
    .ok_or_else(|| ApiError::not_found("Variant not found").in_scope(m, Operation::Update))?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Variant,
        Some(id),
        serde_json::json!({ "product_id": product_id, "price": req.price, "is_active": req.is_active }),
    )
    .await;

    Ok(DataResponse::new(variant))
}

/// DELETE /products/:id/variants/:variant_id
///
/// Variants referenced by orders or purchase orders cannot be deleted (409).
pub async fn delete_variant(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((product_id, id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Variants;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let variant = fetch_variant(&state, product_id, id).await.scoped(m, Operation::Delete)?;
    sqlx::query("DELETE FROM product_variants WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Variant,
        Some(id),
        serde_json::json!({ "product_id": product_id, "sku": variant.sku }),
    )
    .await;

    Ok(NoContent)
}

/// GET /variants/:id/stock
pub async fn variant_stock(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Inventory;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM product_variants WHERE id = $1)")
            .bind(id)
            .fetch_one(&state.db)
            .await
            .scoped(m, Operation::Get)?;
    if !exists {
        return Err(ApiError::not_found("Variant not found").in_scope(m, Operation::Get));
    }

    let summary = sqlx::query_as::<_, StockSummary>(
        r#"
        SELECT $1::uuid AS variant_id,
               COALESCE(SUM(quantity), 0)::bigint AS quantity,
               COALESCE(SUM(reserved), 0)::bigint AS reserved,
               COALESCE(SUM(quantity - reserved), 0)::bigint AS available,
               COUNT(*) AS warehouses
        FROM inventory
        WHERE variant_id = $1
        "#,
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Get)?;

    Ok(DataResponse::new(summary))
}
