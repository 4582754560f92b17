//! Product specification routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use super::products::ensure_product_exists;
use crate::api::{DataResponse, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::products::{ReplaceSpecificationsRequest, SpecificationResponse};
use crate::error::{ApiError, Module, Operation, ResultExt};
use crate::services::audit;

/// PUT /products/:id/specifications
///
/// Replaces the whole set; positions follow the submitted order.
pub async fn replace_specifications(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ReplaceSpecificationsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Specifications;
    auth.ensure_can_write().scoped(m, Operation::Update)?;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::Update)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    sqlx::query("DELETE FROM product_specifications WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .scoped(m, Operation::Update)?;

    let mut specifications = Vec::with_capacity(req.specifications.len());
    for (position, spec) in req.specifications.iter().enumerate() {
        let row = sqlx::query_as::<_, SpecificationResponse>(
            r#"
            INSERT INTO product_specifications (id, product_id, name, value, position)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, value, position
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(spec.name.trim())
        .bind(spec.value.trim())
        .bind(position as i32)
        .fetch_one(&mut *tx)
        .await
        .scoped(m, Operation::Update)?;
        specifications.push(row);
    }
    tx.commit().await.scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Product,
        Some(product_id),
        serde_json::json!({ "specifications": specifications.len() }),
    )
    .await;

    Ok(DataResponse::new(specifications))
}
