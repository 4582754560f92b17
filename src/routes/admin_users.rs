//! Admin account management (owner only for writes)

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::{fetch_admin_user, ADMIN_USER_COLUMNS};
use crate::api::{Created, DataResponse, Paginated, PaginationParams, ValidatedJson};
use crate::app::AppState;
use crate::auth::password::hash_password;
use crate::auth::RequireAuth;
use crate::domain::admin_users::{AdminUserResponse, CreateAdminUserRequest, UpdateAdminUserRequest};
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::error::{ApiError, Module, Operation, ResultExt};
use crate::services::audit;

/// GET /admin-users
pub async fn list_admin_users(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::AdminUsers;
    auth.ensure_owner().scoped(m, Operation::List)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(&state.db)
        .await
        .scoped(m, Operation::List)?;

    let users = sqlx::query_as::<_, AdminUserResponse>(&format!(
        "SELECT {ADMIN_USER_COLUMNS} FROM admin_users ORDER BY created_at ASC LIMIT $1 OFFSET $2"
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::List)?;

    Ok(Paginated::new(users, &pagination, total))
}

/// POST /admin-users
pub async fn create_admin_user(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateAdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::AdminUsers;
    auth.ensure_owner().scoped(m, Operation::Create)?;

    let email = req.email.trim().to_lowercase();
    let password_hash = hash_password(&req.password).scoped(m, Operation::Create)?;

    let user = sqlx::query_as::<_, AdminUserResponse>(&format!(
        r#"
        INSERT INTO admin_users (id, email, display_name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ADMIN_USER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(req.display_name.trim())
    .bind(password_hash)
    .bind(req.role.as_str())
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Create)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Create,
        AuditTargetType::AdminUser,
        Some(user.id),
        serde_json::json!({ "email": user.email, "role": user.role }),
    )
    .await;

    Ok(Created(user))
}

/// PATCH /admin-users/:id
pub async fn update_admin_user(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateAdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::AdminUsers;
    auth.ensure_owner().scoped(m, Operation::Update)?;

    if id == auth.user_id && req.demotes_or_deactivates() {
        return Err(ApiError::unprocessable("You cannot demote or deactivate your own account")
            .in_scope(m, Operation::Update));
    }

    // Make sure the account exists before hashing anything
    fetch_admin_user(&state, id).await.scoped(m, Operation::Update)?;

    let password_hash = match &req.password {
        Some(password) => Some(hash_password(password).scoped(m, Operation::Update)?),
        None => None,
    };

    let user = sqlx::query_as::<_, AdminUserResponse>(&format!(
        r#"
        UPDATE admin_users SET
            display_name = COALESCE($2, display_name),
            role = COALESCE($3, role),
            is_active = COALESCE($4, is_active),
            password_hash = COALESCE($5, password_hash),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ADMIN_USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(req.display_name.as_deref().map(str::trim))
    .bind(req.role.map(|r| r.as_str()))
    .bind(req.is_active)
    .bind(password_hash)
    .fetch_one(&state.db)
    .await
    .scoped(m, Operation::Update)?;

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Update,
        AuditTargetType::AdminUser,
        Some(id),
        serde_json::json!({
            "role": req.role,
            "is_active": req.is_active,
            "password_changed": req.password.is_some(),
        }),
    )
    .await;

    Ok(DataResponse::new(user))
}
