//! Admin audit trail

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::audit::{AdminAction, AuditTargetType};

/// Record an admin action. Failures are logged and swallowed so auditing
/// never turns a successful write into an error response.
pub async fn record(
    db: &PgPool,
    admin_id: Uuid,
    action: AdminAction,
    target_type: AuditTargetType,
    target_id: Option<Uuid>,
    details: serde_json::Value,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_audit_log (id, admin_id, action, target_type, target_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin_id)
    .bind(action.as_str())
    .bind(target_type.as_str())
    .bind(target_id)
    .bind(sqlx::types::Json(&details))
    .execute(db)
    .await;

    match result {
        Ok(_) => tracing::info!(
            admin_id = %admin_id,
            action = %action,
            target_type = %target_type,
            target_id = ?target_id,
            "Admin action logged"
        ),
        Err(e) => tracing::error!(
            admin_id = %admin_id,
            action = %action,
            target_type = %target_type,
            error = %e,
            "Failed to write audit log entry"
        ),
    }
}
