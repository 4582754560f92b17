//! Product media routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::products::ensure_product_exists;
use crate::api::{Created, DataResponse, NoContent, ValidatedJson};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::products::{CreateMediaRequest, MediaResponse, ReorderMediaRequest};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::audit;

pub(crate) const MEDIA_COLUMNS: &str =
    "id, product_id, url, alt_text, media_type, position, created_at";

async fn media_for(state: &AppState, product_id: Uuid) -> ApiResult<Vec<MediaResponse>> {
    let media = sqlx::query_as::<_, MediaResponse>(&format!(
        "SELECT {MEDIA_COLUMNS} FROM product_media WHERE product_id = $1 ORDER BY position, created_at"
    ))
    .bind(product_id)
    .fetch_all(&state.db)
    .await?;
    Ok(media)
}

/// A reorder must name every current media id exactly once.
fn is_permutation(current: &[Uuid], requested: &[Uuid]) -> bool {
    let requested_set: HashSet<&Uuid> = requested.iter().collect();
    requested.len() == current.len()
        && requested_set.len() == requested.len()
        && current.iter().all(|id| requested_set.contains(id))
}

/// GET /products/:id/media
pub async fn list_media(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Media;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::List)?;
    let media = media_for(&state, product_id).await.scoped(m, Operation::List)?;
    Ok(DataResponse::new(media))
}

/// POST /products/:id/media
///
/// New media goes to the end of the list.
pub async fn add_media(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateMediaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Media;
    auth.ensure_can_write().scoped(m, Operation::Create)?;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::Create)?;

    let media = sqlx::query_as::<_, MediaResponse>(&format!(
        r#"
        INSERT INTO product_media (id, product_id, url, alt_text, media_type, position)
        VALUES ($1, $2, $3, $4, $5,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM product_media WHERE product_id = $2))
        RETURNING {MEDIA_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(&req.url)
    .bind(&req.alt_text)
    .bind(req.media_type.as_str())
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::Media,
        Some(media.id),
        serde_json::json!({ "product_id": product_id, "url": media.url }),
    )
    .await;

    Ok(Created(media))
}

/// DELETE /products/:id/media/:media_id
pub async fn delete_media(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((product_id, id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Media;
    auth.ensure_can_write().scoped(m, Operation::Delete)?;

    let result = sqlx::query("DELETE FROM product_media WHERE id = $1 AND product_id = $2")
        .bind(id)
        .bind(product_id)
        .execute(&state.db)
        .await
        .scoped(m, Operation::Delete)?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Media not found").in_scope(m, Operation::Delete));
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Delete,
        AuditTargetType::Media,
        Some(id),
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(NoContent)
}

/// PUT /products/:id/media/order
pub async fn reorder_media(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ReorderMediaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Media;
    auth.ensure_can_write().scoped(m, Operation::Update)?;
    ensure_product_exists(&state, product_id).await.scoped(m, Operation::Update)?;

    let mut tx = state.db.begin().await.scoped(m, Operation::Update)?;
    let current: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM product_media WHERE product_id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_all(&mut *tx)
            .await
            .scoped(m, Operation::Update)?;

    if !is_permutation(&current, &req.ids) {
        return Err(ApiError::unprocessable(
            "ids must list every media item of the product exactly once",
        )
        .in_scope(m, Operation::Update));
    }

    // Position follows the order of the submitted ids
    sqlx::query(
        r#"
        UPDATE product_media pm SET position = o.ord - 1
        FROM UNNEST($2::uuid[]) WITH ORDINALITY AS o(id, ord)
        WHERE pm.id = o.id AND pm.product_id = $1
        "#,
    )
    .bind(product_id)
    .bind(&req.ids)
    .execute(&mut *tx)
    .await
    .scoped(m, Operation::Update)?;
    tx.commit().await.scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::Media,
        None,
        serde_json::json!({ "product_id": product_id, "order": req.ids }),
    )
    .await;

    let media = media_for(&state, product_id).await.scoped(m, Operation::Update)?;
    Ok(DataResponse::new(media))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_requires_the_exact_set() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let current = [a, b, c];

        assert!(is_permutation(&current, &[c, a, b]));
        assert!(!is_permutation(&current, &[a, b]));
        assert!(!is_permutation(&current, &[a, b, b]));
        assert!(!is_permutation(&current, &[a, b, Uuid::new_v4()]));
        assert!(is_permutation(&[], &[]));
    }
}
