use serde::{Deserialize, Serialize};

use crate::domain::admin_users::AdminRole;

/// JWT claims carried by admin access tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (admin user ID)
    pub sub: String,

    /// Admin email
    pub email: String,

    /// Role at the time the token was issued
    pub role: AdminRole,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}
