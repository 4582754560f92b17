//! Admin audit log types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::api::query::opt_from_str;
use crate::api::PaginationParams;

text_enum! {
    /// Admin action types for audit logging
    pub enum AdminAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        StatusChange => "status_change",
        StockAdjust => "stock_adjust",
        Receive => "receive",
        Import => "import",
        Export => "export",
        Login => "login",
    }
}

text_enum! {
    /// Target types for audit logging
    pub enum AuditTargetType {
        AdminUser => "admin_user",
        Brand => "brand",
        Category => "category",
        Product => "product",
        Variant => "variant",
        Media => "media",
        Warehouse => "warehouse",
        Inventory => "inventory",
        PurchaseOrder => "purchase_order",
        Bundle => "bundle",
        Customer => "customer",
        Wishlist => "wishlist",
        Order => "order",
    }
}

/// Response DTO for audit log
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLogResponse {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub admin_name: Option<String>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub details: sqlx::types::Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub admin_id: Option<Uuid>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub action: Option<AdminAction>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub target_type: Option<AuditTargetType>,
}
