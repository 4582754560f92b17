//! Admin login and session routes

use axum::{extract::State, response::IntoResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, ValidatedJson};
use crate::app::AppState;
use crate::auth::password::verify_password;
use crate::auth::RequireAuth;
use crate::domain::admin_users::{AdminUserResponse, LoginRequest, LoginResponse};
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::error::{ApiError, ApiResult, Module, Operation, ResultExt};
use crate::services::audit;

/// Same message for unknown email and wrong password
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    password_hash: String,
    is_active: bool,
}

pub(crate) const ADMIN_USER_COLUMNS: &str =
    "id, email, display_name, role, is_active, last_login_at, created_at, updated_at";

pub(crate) async fn fetch_admin_user(state: &AppState, id: Uuid) -> ApiResult<AdminUserResponse> {
    sqlx::query_as::<_, AdminUserResponse>(&format!(
        "SELECT {ADMIN_USER_COLUMNS} FROM admin_users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Admin user not found"))
}

/// POST /auth/login
///
/// Exchange email and password for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = |e: ApiError| e.in_scope(Module::Auth, Operation::Login);
    let email = req.email.trim().to_lowercase();

    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, password_hash, is_active FROM admin_users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .scoped(Module::Auth, Operation::Login)?;

    let Some(row) = row else {
        tracing::warn!(email = %email, "Login for unknown email");
        return Err(scope(ApiError::unauthorized(INVALID_CREDENTIALS)));
    };

    if !verify_password(&req.password, &row.password_hash) {
        tracing::warn!(admin_id = %row.id, "Login with wrong password");
        return Err(scope(ApiError::unauthorized(INVALID_CREDENTIALS)));
    }
    if !row.is_active {
        tracing::warn!(admin_id = %row.id, "Login for deactivated account");
        return Err(scope(ApiError::unauthorized("Account is deactivated")));
    }

    let user = sqlx::query_as::<_, AdminUserResponse>(&format!(
        "UPDATE admin_users SET last_login_at = NOW() WHERE id = $1 RETURNING {ADMIN_USER_COLUMNS}"
    ))
    .bind(row.id)
    .fetch_one(&state.db)
    .await
    .scoped(Module::Auth, Operation::Login)?;

    let issued = state
        .tokens
        .issue(user.id, &user.email, user.role)
        .scoped(Module::Auth, Operation::Login)?;

    audit::record(
        &state.db,
        user.id,
        AdminAction::Login,
        AuditTargetType::AdminUser,
        Some(user.id),
        serde_json::json!({}),
    )
    .await;

    tracing::info!(admin_id = %user.id, role = %user.role, "Admin logged in");

    Ok(DataResponse::new(LoginResponse {
        access_token: issued.token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
        user,
    }))
}

/// GET /me
///
/// The authenticated admin's account.
pub async fn me(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = fetch_admin_user(&state, auth.user_id)
        .await
        .scoped(Module::Auth, Operation::Get)?;
    Ok(DataResponse::new(user))
}
