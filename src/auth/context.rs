use uuid::Uuid;

use crate::domain::admin_users::AdminRole;
use crate::error::{ApiError, ApiResult};

/// Authenticated admin attached to a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: AdminRole,
}

impl AuthContext {
    /// Viewers are read-only.
    pub fn ensure_can_write(&self) -> ApiResult<()> {
        if self.role.can_write() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Your role does not allow changes"))
        }
    }

    pub fn ensure_owner(&self) -> ApiResult<()> {
        if self.role == AdminRole::Owner {
            Ok(())
        } else {
            Err(ApiError::forbidden("Owner privileges required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ctx(role: AdminRole) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            email: "staff@example.com".into(),
            role,
        }
    }

    #[rstest]
    #[case(AdminRole::Owner, true, true)]
    #[case(AdminRole::Manager, true, false)]
    #[case(AdminRole::Viewer, false, false)]
    fn role_permissions(#[case] role: AdminRole, #[case] write: bool, #[case] owner: bool) {
        let ctx = ctx(role);
        assert_eq!(ctx.ensure_can_write().is_ok(), write);
        assert_eq!(ctx.ensure_owner().is_ok(), owner);
    }
}
