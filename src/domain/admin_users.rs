//! Admin accounts and login DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

text_enum! {
    /// Dashboard role of an admin account
    pub enum AdminRole {
        Owner => "owner",
        Manager => "manager",
        Viewer => "viewer",
    }
}

impl AdminRole {
    /// Unknown stored roles fall back to the least privileged one.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(Self::Viewer)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Owner | Self::Manager)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[sqlx(try_from = "String")]
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: AdminUserResponse,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAdminUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    #[validate(length(min = 12, max = 256, message = "must be at least 12 characters"))]
    pub password: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateAdminUserRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<AdminRole>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    #[validate(length(min = 12, max = 256, message = "must be at least 12 characters"))]
    pub password: Option<String>,
}

impl UpdateAdminUserRequest {
    /// Whether applying this update to one's own account would lock them out
    /// of owner privileges.
    pub fn demotes_or_deactivates(&self) -> bool {
        self.is_active == Some(false) || matches!(self.role, Some(role) if role != AdminRole::Owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_is_viewer() {
        assert_eq!(AdminRole::from_db("owner"), AdminRole::Owner);
        assert_eq!(AdminRole::from_db("superuser"), AdminRole::Viewer);
    }

    #[test]
    fn self_lockout_detection() {
        let keep = UpdateAdminUserRequest {
            display_name: Some("Sam".into()),
            role: Some(AdminRole::Owner),
            ..Default::default()
        };
        assert!(!keep.demotes_or_deactivates());

        let demote = UpdateAdminUserRequest {
            role: Some(AdminRole::Manager),
            ..Default::default()
        };
        assert!(demote.demotes_or_deactivates());

        let deactivate = UpdateAdminUserRequest {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(deactivate.demotes_or_deactivates());
    }

    #[test]
    fn short_password_rejected() {
        let req = CreateAdminUserRequest {
            email: "new@example.com".into(),
            display_name: "New".into(),
            password: "short".into(),
            role: AdminRole::Viewer,
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }
}
