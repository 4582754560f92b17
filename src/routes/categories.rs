//! Category routes, including the nested tree view

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
use crate::domain::categories::{
    CategoryNode, CategoryQuery, CategoryResponse, CategoryTreeQuery, CreateCategoryRequest,
    UpdateCategoryRequest,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::cache::keys;
use crate::services::{audit, category_tree, slug};

const CATEGORY_COLUMNS: &str =
    "id, parent_id, name, slug, description, position, is_active, created_at, updated_at";

const SORTABLE: &[(&str, &str)] = &[
    ("name", "LOWER(name)"),
    ("position", "position"),
    ("created_at", "created_at"),
];

async fn fetch_category(state: &AppState, id: Uuid) -> ApiResult<CategoryResponse> {
    sqlx::query_as::<_, CategoryResponse>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Category not found"))
}

pub(crate) async fn fetch_all_categories(db: &sqlx::PgPool) -> ApiResult<Vec<CategoryResponse>> {
    Ok(
        sqlx::query_as::<_, CategoryResponse>(&format!("SELECT {CATEGORY_COLUMNS} FROM categories"))
            .fetch_all(db)
            .await?,
    )
}

async fn ensure_parent_exists(state: &AppState, parent_id: Uuid) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
        .bind(parent_id)
        .fetch_one(&state.db)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Parent category {parent_id} does not exist")))
    }
}

async fn invalidate_tree(state: &AppState) {
    state.cache.invalidate(keys::category_tree_pattern()).await;
}

/// GET /categories
pub async fn list_categories(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Categories;
    let pattern = like_pattern(query.q.as_deref());
    let filter = r#"
        WHERE ($1::text IS NULL OR name ILIKE $1 OR slug ILIKE $1)
          AND ($2::uuid IS NULL OR parent_id = $2)
          AND ($3::bool IS NULL OR is_active = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM categories {filter}"))
        .bind(&pattern)
        .bind(query.parent_id)
        .bind(query.is_active)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "position");
    let categories = sqlx::query_as::<_, CategoryResponse>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories {filter} ORDER BY {order_by}, id LIMIT $4 OFFSET $5"
    ))
    .bind(&pattern)
    .bind(query.parent_id)
    .bind(query.is_active)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(categories, &query.pagination, total))
}

/// GET /categories/tree
///
/// Nested forest built from the flat table; read through the Redis cache.
pub async fn get_category_tree(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategoryTreeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let include_inactive = query.include_inactive.unwrap_or(false);
    let key = keys::category_tree(include_inactive);

    let tree: Vec<CategoryNode> = state
        .cache
        .get_or_load(&key, state.cache.default_ttl(), || async {
            let rows = fetch_all_categories(&state.db).await?;
            let tree = category_tree::build_tree(&rows, include_inactive);
            tracing::debug!(
                rows = rows.len(),
                nodes = category_tree::count_nodes(&tree),
                "Built category tree"
            );
            Ok::<_, ApiError>(tree)
        })
        .await
        .scoped(Module::Categories, Operation::List)?;

    Ok(DataResponse::new(tree))
}

/// GET /categories/:id
pub async fn get_category(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let category = fetch_category(&state, id)
        .await
        .scoped(Module::Categories, Operation::Get)?;
    Ok(DataResponse::new(category))
}

/// GET /categories/:id/descendants
pub async fn category_descendants(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Categories;
    let rows = fetch_all_categories(&state.db).await.scoped(m, Operation::Get)?;
    if !rows.iter().any(|row| row.id == id) {
        return Err(ApiError::not_found("Category not found").in_scope(m, Operation::Get));
    }
    Ok(DataResponse::new(category_tree::descendant_ids(&rows, id)))
}

/// POST /categories
pub async fn create_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Categories;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    if let Some(parent_id) = req.parent_id {
        ensure_parent_exists(&state, parent_id).await.scoped(m, Operation::Create)?;
    }

    let slug = slug::resolve(req.slug.as_deref(), &req.name);
    let category = sqlx::query_as::<_, CategoryResponse>(&format!(
        r#"
        INSERT INTO categories (id, parent_id, name, slug, description, position, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(req.parent_id)
    .bind(req.name.trim())
    .bind(&slug)
    .bind(&req.description)
    .bind(req.position)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    invalidate_tree(&state).await;
    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Category,
        Some(category.id),
        serde_json::json!({ "name": category.name, "parent_id": category.parent_id }),
    )
    .await;

    Ok(Created(category))
}

/// PATCH /categories/:id
///
/// `parent_id: null` moves the category to the root.
pub async fn update_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Categories;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let current = fetch_category(&state, id).await.scoped(m, Operation::Update)?;

    let parent_id = match req.parent_id {
        Some(Some(parent_id)) => {
            if parent_id == id {
                return Err(ApiError::unprocessable("A category cannot be its own parent")
                    .in_scope(m, Operation::Update));
            }
            ensure_parent_exists(&state, parent_id).await.scoped(m, Operation::Update)?;
            let rows = fetch_all_categories(&state.db).await.scoped(m, Operation::Update)?;
            if category_tree::would_create_cycle(&rows, id, parent_id) {
                return Err(ApiError::unprocessable(
                    "A category cannot be moved under one of its own descendants",
                )
                .in_scope(m, Operation::Update));
            }
            Some(parent_id)
        }
        Some(None) => None,
        None => current.parent_id,
    };

    let category = sqlx::query_as::<_, CategoryResponse>(&format!(
        r#"
        UPDATE categories SET
            parent_id = $2,
            name = COALESCE($3, name),
            slug = COALESCE($4, slug),
            description = COALESCE($5, description),
            position = COALESCE($6, position),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CATEGORY_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(parent_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.slug)
    .bind(&req.description)
    .bind(req.position)
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Update)?;

    invalidate_tree(&state).await;
    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Category,
        Some(id),
        serde_json::json!({
            "parent_id": { "from": current.parent_id, "to": category.parent_id },
            "name": req.name,
            "is_active": req.is_active,
        }),
    )
    .await;

    Ok(DataResponse::new(category))
}

/// DELETE /categories/:id
///
/// Children move up to the deleted category's parent.
pub async fn delete_category(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Categories;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Delete)?;

    let parent: Option<Option<Uuid>> =
        sqlx::query_scalar("SELECT parent_id FROM categories WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .scoped(m, Operation::Delete)?;
    let Some(parent_id) = parent else {
        return Err(ApiError::not_found("Category not found").in_scope(m, Operation::Delete));
    };

    let moved = sqlx::query("UPDATE categories SET parent_id = $2, updated_at = NOW() WHERE parent_id = $1")
        .bind(id)
        .bind(parent_id)
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Delete)?
        .rows_affected();

    sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Delete)?;

    tx.commit().await.scoped(m, Operation::Delete)?;

    invalidate_tree(&state).await;
    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Category,
        Some(id),
        serde_json::json!({ "reparented_children": moved, "new_parent_id": parent_id }),
    )
    .await;

    Ok(NoContent)
}
