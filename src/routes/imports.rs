//! Spreadsheet product import
//!
//! The whole import runs in one transaction with a savepoint per product, so
//! a product that fails a database constraint is reported as a row error
//! without losing the others. A dry run executes the same statements and
//! rolls the transaction back.

use axum::{
    extract::{Multipart, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{Connection, PgConnection};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::products::ProductStatus;
use crate::error::{violated_field, ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::cache::keys;
use crate::services::spreadsheet::products::{parse_products, ProductField, ProductImport};
use crate::services::spreadsheet::{
    read_first_sheet, ImportError, ImportField, ImportReport, RowError,
};
use crate::services::{audit, slug};

#[derive(Debug, Deserialize, Default)]
pub struct ImportParams {
    #[serde(default)]
    pub dry_run: bool,
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::MissingColumns(_) => ApiError::unprocessable(err.to_string()),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

enum Outcome {
    Created,
    Updated,
}

enum ApplyError {
    Row(RowError),
    Db(sqlx::Error),
}

impl From<sqlx::Error> for ApplyError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

/// Row error for a constraint failure; anything else aborts the import.
fn constraint_error(row: usize, err: &sqlx::Error) -> Option<RowError> {
    let db = err.as_database_error()?;
    let detail = match db.code().as_deref() {
        Some("23505") => "duplicates an existing value",
        Some("23514") => "violates a value rule",
        Some("23503") => "references a missing record",
        _ => return None,
    };
    let field = violated_field(err);
    let message = match &field {
        Some(field) => format!("{field} {detail}"),
        None => format!("row {detail}"),
    };
    Some(RowError::new(row, field.as_deref(), message))
}

/// Category lookup by slug or lowercase name
struct CategoryIndex {
    by_slug: HashMap<String, Uuid>,
    by_name: HashMap<String, Uuid>,
}

impl CategoryIndex {
    async fn load(conn: &mut PgConnection) -> Result<Self, sqlx::Error> {
        let rows: Vec<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, slug, name FROM categories")
                .fetch_all(&mut *conn)
                .await?;
        let mut by_slug = HashMap::new();
        let mut by_name = HashMap::new();
        for (id, slug, name) in rows {
            by_slug.insert(slug, id);
            by_name.entry(name.trim().to_lowercase()).or_insert(id);
        }
        Ok(Self { by_slug, by_name })
    }

    fn resolve(&self, token: &str) -> Option<Uuid> {
        let lower = token.trim().to_lowercase();
        self.by_slug
            .get(&lower)
            .or_else(|| self.by_name.get(&lower))
            .or_else(|| self.by_slug.get(&slug::slugify(token)))
            .copied()
    }
}

async fn resolve_brand(conn: &mut PgConnection, name: &str) -> Result<Uuid, sqlx::Error> {
    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM brands WHERE LOWER(name) = LOWER($1) ORDER BY created_at LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let slug = slug::slugify(name);
    let inserted: Option<Uuid> = sqlx::query_scalar(
        "INSERT INTO brands (id, name, slug) VALUES ($1, $2, $3) ON CONFLICT (slug) DO NOTHING RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&slug)
    .fetch_optional(&mut *conn)
    .await?;
    match inserted {
        Some(id) => Ok(id),
        None => {
            sqlx::query_scalar("SELECT id FROM brands WHERE slug = $1")
                .bind(&slug)
                .fetch_one(&mut *conn)
                .await
        }
    }
}

async fn apply_product(
    conn: &mut PgConnection,
    categories: &CategoryIndex,
    product: &ProductImport,
) -> Result<Outcome, ApplyError> {
    let row = product.row;

    let mut category_ids = Vec::with_capacity(product.categories.len());
    for token in &product.categories {
        match categories.resolve(token) {
            Some(id) if !category_ids.contains(&id) => category_ids.push(id),
            Some(_) => {}
            None => {
                return Err(ApplyError::Row(RowError::new(
                    row,
                    Some(ProductField::Categories.name()),
                    format!("unknown category '{token}'"),
                )))
            }
        }
    }

    let brand_id = match &product.brand {
        Some(name) => Some(resolve_brand(conn, name).await?),
        None => None,
    };

    let existing: Option<(Uuid, String)> = sqlx::query_as(
        "SELECT id, status FROM products WHERE LOWER(sku) = LOWER($1) LIMIT 1 FOR UPDATE",
    )
    .bind(&product.sku)
    .fetch_optional(&mut *conn)
    .await?;

    let (product_id, outcome, current_status) = match existing {
        Some((id, status)) => {
            let current: ProductStatus = status.parse().map_err(|e: String| {
                ApplyError::Row(RowError::new(row, None, e))
            })?;
            sqlx::query(
                r#"
                UPDATE products SET
                    name = $2,
                    description = COALESCE($3, description),
                    brand_id = COALESCE($4, brand_id),
                    base_price = $5,
                    compare_at_price = $6,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(brand_id)
            .bind(product.base_price)
            .bind(product.compare_at_price)
            .execute(&mut *conn)
            .await?;
            (id, Outcome::Updated, Some(current))
        }
        None => {
            let id = Uuid::new_v4();
            let base_slug = slug::slugify(&product.name);
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1)")
                    .bind(&base_slug)
                    .fetch_one(&mut *conn)
                    .await?;
            let product_slug = if taken {
                slug::slugify(&format!("{} {}", product.name, product.sku))
            } else {
                base_slug
            };

            sqlx::query(
                r#"
                INSERT INTO products (id, brand_id, name, slug, sku, description, status, base_price, compare_at_price)
                VALUES ($1, $2, $3, $4, $5, $6, 'draft', $7, $8)
                "#,
            )
            .bind(id)
            .bind(brand_id)
            .bind(&product.name)
            .bind(&product_slug)
            .bind(&product.sku)
            .bind(&product.description)
            .bind(product.base_price)
            .bind(product.compare_at_price)
            .execute(&mut *conn)
            .await?;
            (id, Outcome::Created, None)
        }
    };

    if !category_ids.is_empty() {
        super::products::replace_categories(conn, product_id, &category_ids).await?;
    }

    for variant in &product.variants {
        let owner: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT id, product_id FROM product_variants WHERE LOWER(sku) = LOWER($1) LIMIT 1",
        )
        .bind(&variant.sku)
        .fetch_optional(&mut *conn)
        .await?;

        match owner {
            Some((_, other)) if other != product_id => {
                return Err(ApplyError::Row(RowError::new(
                    variant.row,
                    Some(ProductField::VariantSku.name()),
                    format!("variant sku '{}' belongs to another product", variant.sku),
                )))
            }
            Some((variant_id, _)) => {
                sqlx::query(
                    "UPDATE product_variants SET name = $2, price = $3, updated_at = NOW() WHERE id = $1",
                )
                .bind(variant_id)
                .bind(&variant.name)
                .bind(variant.price)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO product_variants (id, product_id, sku, name, price) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(product_id)
                .bind(&variant.sku)
                .bind(&variant.name)
                .bind(variant.price)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    if let Some(target) = product.status {
        let current = current_status.unwrap_or(ProductStatus::Draft);
        if target != current {
            if !current.can_transition_to(target) {
                return Err(ApplyError::Row(RowError::new(
                    row,
                    Some(ProductField::Status.name()),
                    format!("cannot change status from {current} to {target}"),
                )));
            }
            if target == ProductStatus::Active {
                let active_variants: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM product_variants WHERE product_id = $1 AND is_active",
                )
                .bind(product_id)
                .fetch_one(&mut *conn)
                .await?;
                if active_variants == 0 {
                    return Err(ApplyError::Row(RowError::new(
                        row,
                        Some(ProductField::Status.name()),
                        "an active product needs at least one active variant",
                    )));
                }
            }
            sqlx::query("UPDATE products SET status = $2 WHERE id = $1")
                .bind(product_id)
                .bind(target.as_str())
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(outcome)
}

/// First uploaded file in the form, whatever its field name.
async fn read_upload(multipart: &mut Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("The uploaded file is empty"));
        }
        return Ok(bytes.to_vec());
    }
    Err(ApiError::bad_request("Expected a multipart field named 'file'"))
}

/// POST /imports/products?dry_run=
pub async fn import_products(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImportParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Imports;
    auth.ensure_can_write().scoped(m, Operation::Import)?;

    let bytes = read_upload(&mut multipart).await.scoped(m, Operation::Import)?;
    let size = bytes.len();

    // Workbook decoding is CPU-bound
    let parsed = tokio::task::spawn_blocking(move || {
        read_first_sheet(bytes).and_then(|grid| parse_products(&grid))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()).in_scope(m, Operation::Import))?
    .scoped(m, Operation::Import)?;

    let mut errors = parsed.errors;
    let mut skipped = parsed.skipped;
    let mut created = 0;
    let mut updated = 0;

    let mut tx = state.db.begin().await.scoped(m, Operation::Import)?;
    let categories = CategoryIndex::load(&mut tx).await.scoped(m, Operation::Import)?;

    for product in &parsed.products {
        let mut savepoint = Connection::begin(&mut *tx).await.scoped(m, Operation::Import)?;
        match apply_product(&mut savepoint, &categories, product).await {
            Ok(outcome) => {
                savepoint.commit().await.scoped(m, Operation::Import)?;
                match outcome {
                    Outcome::Created => created += 1,
                    Outcome::Updated => updated += 1,
                }
            }
            Err(ApplyError::Row(error)) => {
                savepoint.rollback().await.scoped(m, Operation::Import)?;
                errors.push(error);
                skipped += 1;
            }
            Err(ApplyError::Db(e)) => match constraint_error(product.row, &e) {
                Some(error) => {
                    savepoint.rollback().await.scoped(m, Operation::Import)?;
                    errors.push(error);
                    skipped += 1;
                }
                None => return Err(ApiError::from(e).in_scope(m, Operation::Import)),
            },
        }
    }

    if params.dry_run {
        tx.rollback().await.scoped(m, Operation::Import)?;
    } else {
        tx.commit().await.scoped(m, Operation::Import)?;
        state.cache.invalidate(keys::dashboard_stats()).await;
    }

    errors.sort_by_key(|e| e.row);
    info!(
        admin_id = %auth.user_id,
        dry_run = params.dry_run,
        bytes = size,
        total_rows = parsed.total_rows,
        created,
        updated,
        skipped,
        "Product import finished"
    );

    if !params.dry_run {
        audit::record(
            &state.db,
            auth.user_id,
            AdminAction::Import,
            AuditTargetType::Product,
            None,
            serde_json::json!({
                "total_rows": parsed.total_rows,
                "created": created,
                "updated": updated,
                "skipped": skipped,
            }),
        )
        .await;
    }

    Ok(DataResponse::new(ImportReport {
        dry_run: params.dry_run,
        total_rows: parsed.total_rows,
        created,
        updated,
        skipped,
        errors,
        column_mapping: parsed.mapping.matched,
        unmatched_headers: parsed.mapping.unmatched_headers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn import_errors_map_to_http_statuses() {
        let missing: ApiError = ImportError::MissingColumns(vec!["sku"]).into();
        assert_eq!(missing.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let unreadable: ApiError = ImportError::Unreadable("zip".into()).into();
        assert_eq!(unreadable.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(ImportError::NoHeader).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn categories_resolve_by_slug_or_name() {
        let kitchen = Uuid::new_v4();
        let mugs = Uuid::new_v4();
        let index = CategoryIndex {
            by_slug: HashMap::from([
                ("kitchen".to_string(), kitchen),
                ("coffee-mugs".to_string(), mugs),
            ]),
            by_name: HashMap::from([("mugs & cups".to_string(), mugs)]),
        };

        assert_eq!(index.resolve("kitchen"), Some(kitchen));
        assert_eq!(index.resolve(" Mugs & Cups "), Some(mugs));
        assert_eq!(index.resolve("Coffee Mugs"), Some(mugs));
        assert_eq!(index.resolve("garden"), None);
    }

    #[test]
    fn dry_run_defaults_off() {
        let params: ImportParams = serde_json::from_str("{}").unwrap();
        assert!(!params.dry_run);
    }
}
