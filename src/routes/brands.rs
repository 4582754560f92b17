//! Brand routes

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
use crate::domain::brands::{BrandQuery, BrandResponse, CreateBrandRequest, UpdateBrandRequest};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::{audit, slug};

const BRAND_SELECT: &str = r#"
    SELECT b.id, b.name, b.slug, b.description, b.logo_url, b.website_url, b.is_active,
           (SELECT COUNT(*) FROM products p WHERE p.brand_id = b.id) AS product_count,
           b.created_at, b.updated_at
    FROM brands b
"#;

const SORTABLE: &[(&str, &str)] = &[("name", "LOWER(b.name)"), ("created_at", "b.created_at")];

async fn fetch_brand(state: &AppState, id: Uuid) -> ApiResult<BrandResponse> {
    sqlx::query_as::<_, BrandResponse>(&format!("{BRAND_SELECT} WHERE b.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Brand not found"))
}

/// GET /brands
pub async fn list_brands(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrandQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Brands;
    let pattern = like_pattern(query.q.as_deref());
    let filter = "WHERE ($1::text IS NULL OR b.name ILIKE $1) AND ($2::bool IS NULL OR b.is_active = $2)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM brands b {filter}"))
        .bind(&pattern)
        .bind(query.is_active)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "b.created_at");
    let brands = sqlx::query_as::<_, BrandResponse>(&format!(
        "{BRAND_SELECT} {filter} ORDER BY {order_by}, b.id LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(query.is_active)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(brands, &query.pagination, total))
}

/// GET /brands/:id
pub async fn get_brand(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let brand = fetch_brand(&state, id).await.scoped(Module::Brands, Operation::Get)?;
    Ok(DataResponse::new(brand))
}

/// POST /brands
pub async fn create_brand(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateBrandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Brands;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    let id = Uuid::new_v4();
    let slug = slug::resolve(req.slug.as_deref(), &req.name);

    sqlx::query(
        r#"
        INSERT INTO brands (id, name, slug, description, logo_url, website_url, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(req.name.trim())
    .bind(&slug)
    .bind(&req.description)
    .bind(&req.logo_url)
    .bind(&req.website_url)
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Brand,
        Some(id),
        serde_json::json!({ "name": req.name, "slug": slug }),
    )
    .await;

    let brand = fetch_brand(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(brand))
}

/// PATCH /brands/:id
pub async fn update_brand(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateBrandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Brands;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let result = sqlx::query(
        r#"
        UPDATE brands SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description),
            logo_url = COALESCE($5, logo_url),
            website_url = COALESCE($6, website_url),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.slug)
    .bind(&req.description)
    .bind(&req.logo_url)
    .bind(&req.website_url)
    .bind(req.is_active)
    .execute(&state.db)
    .await
    .scoped(m, Operation::Update)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Brand not found").in_scope(m, Operation::Update));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Brand,
        Some(id),
        serde_json::json!({ "name": req.name, "slug": req.slug, "is_active": req.is_active }),
    )
    .await;

    let brand = fetch_brand(&state, id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(brand))
}

/// DELETE /brands/:id
///
/// Products keep existing without a brand.
pub async fn delete_brand(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Brands;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result = sqlx::query("DELETE FROM brands WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Brand not found").in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Brand,
        Some(id),
        serde_json::json!({}),
    )
    .await;

    Ok(NoContent)
}
