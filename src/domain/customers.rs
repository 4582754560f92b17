//! Customers and their wishlists

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::brands::default_true;
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub order_count: i64,
    /// Sum of grand totals over non-cancelled orders
    pub lifetime_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emails are stored lowercased and trimmed.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(min = 5, max = 32))]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateCustomerRequest {
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 5, max = 32))]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CustomerQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    /// Matches first name, last name or email
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WishlistItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub base_price: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddWishlistItemRequest {
    pub product_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }
}
