//! Product routes: CRUD, category assignment and status transitions

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use super::categories::fetch_all_categories;
use crate::api::query::like_pattern;
use crate::api::{Created, DataResponse, NoContent, Paginated, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::brands::BrandSummary;
use crate::domain::products::{
    check_compare_at, CreateProductRequest, MediaResponse, ProductDetail, ProductQuery,
    ProductResponse, ProductStatus, ProductStatusRequest, SpecificationResponse,
    UpdateProductRequest, VariantResponse,
};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::{audit, category_tree, slug};

pub(crate) const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.brand_id, b.name AS brand_name, p.name, p.slug, p.sku, p.description,
           p.status, p.base_price, p.compare_at_price,
           (SELECT COUNT(*) FROM product_variants v WHERE v.product_id = p.id) AS variant_count,
           p.created_at, p.updated_at
    FROM products p
    LEFT JOIN brands b ON b.id = p.brand_id
"#;

const SORTABLE: &[(&str, &str)] = &[
    ("name", "LOWER(p.name)"),
    ("base_price", "p.base_price"),
    ("created_at", "p.created_at"),
    ("updated_at", "p.updated_at"),
];

pub(crate) async fn fetch_product(state: &AppState, id: Uuid) -> ApiResult<ProductResponse> {
    sqlx::query_as::<_, ProductResponse>(&format!("{PRODUCT_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

/// 404 unless the product exists
pub(crate) async fn ensure_product_exists(state: &AppState, id: Uuid) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found("Product not found"))
    }
}

async fn ensure_brand_exists(state: &AppState, brand_id: Uuid) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM brands WHERE id = $1)")
        .bind(brand_id)
        .fetch_one(&state.db)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Brand {brand_id} does not exist")))
    }
}

async fn ensure_categories_exist(state: &AppState, ids: &[Uuid]) -> ApiResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ANY($1)")
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
            "Unknown category ids: {}",
            missing.join(", ")
        )))
    }
}

/// Replace the product's category assignment inside the caller's transaction.
pub(crate) async fn replace_categories(
    conn: &mut PgConnection,
    product_id: Uuid,
    category_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    if !category_ids.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO product_categories (product_id, category_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(category_ids)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// GET /products
pub async fn list_products(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Products;

    // A category filter matches products anywhere below it
    let category_ids: Option<Vec<Uuid>> = match query.category_id {
        Some(root) => {
            let rows = fetch_all_categories(&state.db).await.scoped(m, Operation::List)?;
            let mut ids = category_tree::descendant_ids(&rows, root);
            ids.push(root);
            Some(ids)
        }
        None => None,
    };

    let pattern = like_pattern(query.q.as_deref());
    let filter = r#"
        WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1)
          AND ($2::uuid IS NULL OR p.brand_id = $2)
          AND ($3::uuid[] IS NULL OR EXISTS (
                SELECT 1 FROM product_categories pc
                WHERE pc.product_id = p.id AND pc.category_id = ANY($3)))
          AND ($4::text IS NULL OR p.status = $4)
          AND ($5::numeric IS NULL OR p.base_price >= $5)
          AND ($6::numeric IS NULL OR p.base_price <= $6)
    "#;
    let status = query.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p {filter}"))
        .bind(&pattern)
        .bind(query.brand_id)
        .bind(&category_ids)
        .bind(status)
        .bind(query.min_price)
        .bind(query.max_price)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let order_by = query.sort.order_by(SORTABLE, "p.created_at");
    let products = sqlx::query_as::<_, ProductResponse>(&format!(
        "{PRODUCT_SELECT} {filter} ORDER BY {order_by}, p.id LIMIT $7 OFFSET $8"
    ))
    .bind(&pattern)
    .bind(query.brand_id)
    .bind(&category_ids)
    .bind(status)
    .bind(query.min_price)
    .bind(query.max_price)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(products, &query.pagination, total))
}

async fn load_detail(state: &AppState, id: Uuid) -> ApiResult<ProductDetail> {
    let product = fetch_product(state, id).await?;

    let brand = match product.brand_id {
        Some(brand_id) => {
            sqlx::query_as::<_, BrandSummary>("SELECT id, name, slug FROM brands WHERE id = $1")
                .bind(brand_id)
                .fetch_optional(&state.db)
                .await?
        }
        None => None,
    };

    let category_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT category_id FROM product_categories WHERE product_id = $1 ORDER BY category_id",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let variants = sqlx::query_as::<_, VariantResponse>(&format!(
        "SELECT {} FROM product_variants WHERE product_id = $1 ORDER BY created_at, sku",
        super::variants::VARIANT_COLUMNS
    ))
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let media = sqlx::query_as::<_, MediaResponse>(&format!(
        "SELECT {} FROM product_media WHERE product_id = $1 ORDER BY position, created_at",
        super::media::MEDIA_COLUMNS
    ))
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let specifications = sqlx::query_as::<_, SpecificationResponse>(
        "SELECT id, name, value, position FROM product_specifications WHERE product_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(ProductDetail {
        product,
        brand,
        category_ids,
        variants,
        media,
        specifications,
    })
}

/// GET /products/:id
///
/// Product with brand, categories, variants, media and specifications.
pub async fn get_product(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = load_detail(&state, id).await.scoped(Module::Products, Operation::Get)?;
    Ok(DataResponse::new(detail))
}

/// POST /products
pub async fn create_product(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Products;
    auth.ensure_can_write().scoped(m, Operation::Create)?;

    if req.status == ProductStatus::Active {
        return Err(ApiError::unprocessable(
            "New products start as draft; activate them once a variant exists",
        )
        .in_scope(m, Operation::Create));
    }
    if let Some(brand_id) = req.brand_id {
        ensure_brand_exists(&state, brand_id).await.scoped(m, Operation::Create)?;
    }
    ensure_categories_exist(&state, &req.category_ids)
        .await
        .scoped(m, Operation::Create)?;

    let id = Uuid::new_v4();
    let slug = slug::resolve(req.slug.as_deref(), &req.name);

    let mut tx = state.db.begin().await.scoped(m, Operation::Create)?;
    sqlx::query(
        r#"
        INSERT INTO products (id, brand_id, name, slug, sku, description, status, base_price, compare_at_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(req.brand_id)
    .bind(req.name.trim())
    .bind(&slug)
    .bind(req.sku.trim())
    .bind(&req.description)
    .bind(req.status.as_str())
    .bind(req.base_price)
    .bind(req.compare_at_price)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Create)?;

    replace_categories(&mut tx, id, &req.category_ids)
        .await
        .scoped(m, Operation::Create)?;
    tx.commit().await.scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Product,
        Some(id),
        serde_json::json!({ "sku": req.sku, "name": req.name }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Create)?;
    Ok(Created(detail))
}

/// PATCH /products/:id
///
/// Status changes go through `POST /products/:id/status`.
pub async fn update_product(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Products;
    auth.ensure_can_write().scoped(m, Operation::Update)?;

    let current = fetch_product(&state, id).await.scoped(m, Operation::Update)?;

    let base_price = req.base_price.unwrap_or(current.base_price);
    let compare_at_price = match req.compare_at_price {
        Some(value) => value,
        None => current.compare_at_price,
    };
    check_compare_at(Some(base_price), compare_at_price).map_err(|e| {
        ApiError::bad_request(
            e.message
                .map(|msg| msg.to_string())
                .unwrap_or_else(|| "Invalid compare_at_price".to_string()),
        )
        .in_scope(m, Operation::Update)
    })?;

    let brand_id = match req.brand_id {
        Some(Some(brand_id)) => {
            ensure_brand_exists(&state, brand_id).await.scoped(m, Operation::Update)?;
            Some(brand_id)
        }
        Some(None) => None,
        None => current.brand_id,
    };
    if let Some(category_ids) = &req.category_ids {
        ensure_categories_exist(&state, category_ids)
            .await
            .scoped(m, Operation::Update)?;
    }

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    sqlx::query(
        r#"
        UPDATE products SET
            brand_id = $2,
            name = COALESCE($3, name),
            slug = COALESCE($4, slug),
            sku = COALESCE($5, sku),
            description = COALESCE($6, description),
            base_price = $7,
            compare_at_price = $8,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(brand_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.slug)
    .bind(req.sku.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(base_price)
    .bind(compare_at_price)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;

    if let Some(category_ids) = &req.category_ids {
        replace_categories(&mut tx, id, category_ids)
            .await
            .scoped(m, Operation::Update)?;
    }
    tx.commit().await.scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Product,
        Some(id),
        serde_json::json!({
            "name": req.name,
            "sku": req.sku,
            "base_price": req.base_price,
            "categories_replaced": req.category_ids.is_some(),
        }),
    )
    .await;

    let detail = load_detail(&state, id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(detail))
}

/// POST /products/:id/status
pub async fn set_product_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ProductStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Products;
    auth.ensure_can_write().scoped(m, Operation::Transition)?;

    let current = fetch_product(&state, id).await.scoped(m, Operation::Transition)?;
    if !current.status.can_transition_to(req.status) {
        return Err(ApiError::unprocessable(format!(
            "Cannot change product status from {} to {}",
            current.status, req.status
        ))
        .in_scope(m, Operation::Transition));
    }

    if req.status == ProductStatus::Active {
        let active_variants: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM product_variants WHERE product_id = $1 AND is_active",
        )
        .bind(id)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::Transition)?;
        if active_variants == 0 {
            return Err(ApiError::unprocessable(
                "A product needs at least one active variant before it can be activated",
            )
            .in_scope(m, Operation::Transition));
        }
    }

    // Guard on the old status so a concurrent transition is not overwritten
    let result = sqlx::query(
        "UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
    )
    .bind(id)
    .bind(req.status.as_str())
    .bind(current.status.as_str())
    .execute(&state.db)
    .await
    .scoped(m, Operation::Transition)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Product status changed concurrently; reload and retry")
            .in_scope(m, Operation::Transition));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::StatusChange,
        AuditTargetType::Product,
        Some(id),
        serde_json::json!({ "from": current.status, "to": req.status }),
    )
    .await;

    let product = fetch_product(&state, id).await.scoped(m, Operation::Transition)?;
    Ok(DataResponse::new(product))
}

/// DELETE /products/:id
///
/// Variants, media, specifications and category links go with it.
pub async fn delete_product(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Products;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found").in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Product,
        Some(id),
        serde_json::json!({}),
    )
    .await;

    Ok(NoContent)
}
