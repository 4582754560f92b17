//! First-run owner account

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use super::password::hash_password;
use crate::config::BootstrapOwner;
use crate::domain::admin_users::AdminRole;

/// Create the configured owner if no admin account exists yet.
///
/// Returns whether an account was created.
pub async fn ensure_owner(db: &PgPool, owner: &BootstrapOwner) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users")
        .fetch_one(db)
        .await
        .context("Failed to count admin users")?;
    if existing > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(&owner.password)?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO admin_users (id, email, display_name, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&owner.email)
    .bind("Owner")
    .bind(password_hash)
    .bind(AdminRole::Owner.as_str())
    .execute(db)
    .await
    .context("Failed to create bootstrap owner")?;

    let created = inserted.rows_affected() > 0;
    if created {
        tracing::info!(email = %owner.email, "Created bootstrap owner account");
    }
    Ok(created)
}
