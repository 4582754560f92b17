//! HS256 access tokens for admin sessions

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use super::Claims;
use crate::domain::admin_users::AdminRole;

/// Issues and verifies admin JWTs
#[derive(Clone)]
pub struct TokenService {
    inner: Arc<TokenKeys>,
    issuer: String,
    ttl_seconds: i64,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

impl TokenService {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            inner: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            issuer: issuer.into(),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str, role: AdminRole) -> Result<IssuedToken> {
        self.issue_at(user_id, email, role, Utc::now().timestamp())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        role: AdminRole,
        issued_at: i64,
    ) -> Result<IssuedToken> {
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: issued_at + self.ttl_seconds,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .context("Failed to sign access token")?;

        Ok(IssuedToken {
            token,
            expires_in: self.ttl_seconds,
        })
    }

    /// Verify signature, issuer and expiry
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.leeway = 30;

        let data = decode::<Claims>(token, &self.inner.decoding, &validation)
            .context("Invalid access token")?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret";

    #[test]
    fn round_trips_claims() {
        let service = TokenService::new(SECRET, "commerce-admin", 3600);
        let user_id = Uuid::new_v4();

        let issued = service
            .issue(user_id, "ops@example.com", AdminRole::Manager)
            .unwrap();
        assert_eq!(issued.expires_in, 3600);

        let claims = service.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "ops@example.com");
        assert_eq!(claims.role, AdminRole::Manager);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn rejects_expired_token() {
        let service = TokenService::new(SECRET, "commerce-admin", 60);
        let issued = service
            .issue_at(
                Uuid::new_v4(),
                "ops@example.com",
                AdminRole::Owner,
                Utc::now().timestamp() - 3600,
            )
            .unwrap();
        assert!(service.verify(&issued.token).is_err());
    }

    #[test]
    fn rejects_foreign_issuer_and_key() {
        let ours = TokenService::new(SECRET, "commerce-admin", 3600);
        let other_issuer = TokenService::new(SECRET, "someone-else", 3600);
        let other_key = TokenService::new("another-secret-another-secret-xx", "commerce-admin", 3600);

        let token = other_issuer
            .issue(Uuid::new_v4(), "a@example.com", AdminRole::Viewer)
            .unwrap()
            .token;
        assert!(ours.verify(&token).is_err());

        let token = other_key
            .issue(Uuid::new_v4(), "a@example.com", AdminRole::Viewer)
            .unwrap()
            .token;
        assert!(ours.verify(&token).is_err());
    }
}
