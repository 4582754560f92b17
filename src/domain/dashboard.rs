use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Count per status value
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LowStockVariant {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub available: i64,
}

/// Admin dashboard statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub products_by_status: Vec<StatusCount>,
    pub total_customers: i64,
    pub orders_by_status: Vec<StatusCount>,
    pub total_revenue: Decimal,
    pub revenue_30d: Decimal,
    pub orders_30d: i64,
    pub low_stock_threshold: i64,
    pub low_stock: Vec<LowStockVariant>,
}
