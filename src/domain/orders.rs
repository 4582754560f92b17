//! Orders and order lines

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::money_amount;
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

text_enum! {
    pub enum OrderStatus {
        Pending => "pending",
        Paid => "paid",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

impl OrderStatus {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Cancelled)
                | (Paid, Fulfilled)
                | (Paid, Refunded)
                | (Paid, Cancelled)
                | (Fulfilled, Refunded)
        )
    }

    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Pending | Self::Cancelled)
    }

    /// Statuses whose totals count as revenue
    pub fn counts_as_revenue(&self) -> bool {
        matches!(self, Self::Paid | Self::Fulfilled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub customer_email: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub shipping_address: Option<sqlx::types::Json<serde_json::Value>>,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderItemInput {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 10_000))]
    pub quantity: i32,
}

fn iso_currency(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("must be a three-letter ISO 4217 code".into());
        Err(err)
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 200), nested)]
    pub items: Vec<OrderItemInput>,
    #[serde(default = "default_currency")]
    #[validate(custom(function = "iso_currency"))]
    pub currency: String,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub discount_total: Decimal,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub shipping_total: Decimal,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub tax_total: Decimal,
    #[serde(default)]
    pub shipping_address: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrderQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub status: Option<OrderStatus>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub customer_id: Option<Uuid>,
    /// Matches order number or customer email
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub placed_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub placed_to: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub min_total: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub max_total: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        use OrderStatus::*;
        let allowed = [
            (Pending, Paid),
            (Pending, Cancelled),
            (Paid, Fulfilled),
            (Paid, Refunded),
            (Paid, Cancelled),
            (Fulfilled, Refunded),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(*to),
                    allowed.contains(&(*from, *to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn deletable_and_revenue_statuses() {
        use OrderStatus::*;
        assert!(Pending.is_deletable());
        assert!(Cancelled.is_deletable());
        assert!(!Paid.is_deletable());
        assert!(Paid.counts_as_revenue());
        assert!(Fulfilled.counts_as_revenue());
        assert!(!Refunded.counts_as_revenue());
    }

    #[test]
    fn currency_defaults_and_validates() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "customer_id": Uuid::new_v4(),
            "items": [{"variant_id": Uuid::new_v4(), "quantity": 2}]
        }))
        .unwrap();
        assert_eq!(req.currency, "USD");
        assert!(req.validate().is_ok());

        let bad: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "customer_id": Uuid::new_v4(),
            "currency": "usd",
            "items": [{"variant_id": Uuid::new_v4(), "quantity": 2}]
        }))
        .unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn charges_beyond_stored_precision_are_rejected() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "customer_id": Uuid::new_v4(),
            "items": [{"variant_id": Uuid::new_v4(), "quantity": 1}],
            "shipping_total": "79228162514264337593543950335",
            "tax_total": "79228162514264337593543950335"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("shipping_total"));
        assert!(fields.contains_key("tax_total"));
    }
}
