use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use super::AuthContext;
use crate::app::AppState;
use crate::domain::admin_users::AdminRole;
use crate::error::{ApiError, Module, Operation};

/// Extractor that requires a valid admin bearer token.
///
/// The role is re-read from `admin_users` so deactivation and demotion take
/// effect before the token expires.
///
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, admin {}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn rejection(message: &str) -> ApiError {
    ApiError::unauthorized(message).in_scope(Module::Auth, Operation::Get)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| rejection("Missing authorization token"))?
            .to_str()
            .map_err(|_| rejection("Invalid authorization format"))?;

        let token = bearer_token(auth_header).ok_or_else(|| rejection("Invalid authorization format"))?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            rejection("Invalid or expired token")
        })?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| rejection("Invalid user ID in token"))?;

        let row: Option<(String, String, bool)> =
            sqlx::query_as("SELECT email, role, is_active FROM admin_users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| ApiError::from(e).in_scope(Module::Auth, Operation::Get))?;

        let Some((email, role, is_active)) = row else {
            return Err(rejection("Account no longer exists"));
        };
        if !is_active {
            tracing::warn!(user_id = %user_id, "Deactivated admin attempted access");
            return Err(rejection("Account is deactivated"));
        }

        Ok(RequireAuth(AuthContext {
            user_id,
            email,
            role: AdminRole::from_db(&role),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
