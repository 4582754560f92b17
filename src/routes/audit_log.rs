//! Audit log browsing

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::Paginated;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AuditLogQuery, AuditLogResponse};
use crate::error::{ApiError, Module, Operation, ResultExt};

/// GET /audit-log
///
/// Newest first.
pub async fn list_audit_log(
    _auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Audit;
    let action = query.action.map(|a| a.as_str());
    let target_type = query.target_type.map(|t| t.as_str());
    let filter = r#"
        WHERE ($1::uuid IS NULL OR l.admin_id = $1)
          AND ($2::text IS NULL OR l.action = $2)
          AND ($3::text IS NULL OR l.target_type = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM admin_audit_log l {filter}"))
        .bind(query.admin_id)
        .bind(action)
        .bind(target_type)
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let entries = sqlx::query_as::<_, AuditLogResponse>(&format!(
        r#"
        SELECT l.id, l.admin_id, a.display_name AS admin_name, l.action, l.target_type,
               l.target_id, l.details, l.created_at
        FROM admin_audit_log l
        LEFT JOIN admin_users a ON a.id = l.admin_id
        {filter}
        ORDER BY l.created_at DESC, l.id
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(query.admin_id)
    .bind(action)
    .bind(target_type)
    .bind(query.pagination.limit())
    .bind(query.pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(entries, &query.pagination, total))
}
