//! Purchase orders for restocking warehouses

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
    pub enum PurchaseOrderStatus {
        Draft => "draft",
        Ordered => "ordered",
        Received => "received",
        Cancelled => "cancelled",
    }
}

impl PurchaseOrderStatus {
    pub fn can_transition_to(&self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, Ordered) | (Ordered, Received) | (Draft, Cancelled) | (Ordered, Cancelled)
        )
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub reference: String,
    pub supplier_name: String,
    pub warehouse_id: Uuid,
    pub warehouse_code: String,
    #[sqlx(try_from = "String")]
    pub status: PurchaseOrderStatus,
    pub notes: Option<String>,
    pub expected_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrderItemResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub variant_name: String,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub line_cost: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrderResponse,
    pub items: Vec<PurchaseOrderItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderItemInput {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 1_000_000))]
    pub quantity: i32,
    #[validate(custom(function = "money_amount"))]
    pub unit_cost: Decimal,
}

fn distinct_variants(items: &[PurchaseOrderItemInput]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    if items.iter().all(|item| seen.insert(item.variant_id)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("duplicate_variant");
        err.message = Some("each variant may appear only once".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub reference: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub supplier_name: String,
    pub warehouse_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 500), nested, custom(function = "distinct_variants"))]
    pub items: Vec<PurchaseOrderItemInput>,
}

/// Only allowed while the order is still a draft
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdatePurchaseOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub supplier_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(length(min = 1, max = 500), nested, custom(function = "distinct_variants"))]
    pub items: Option<Vec<PurchaseOrderItemInput>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PurchaseOrderStatusRequest {
    pub status: PurchaseOrderStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PurchaseOrderQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub status: Option<PurchaseOrderStatus>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub warehouse_id: Option<Uuid>,
    pub supplier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transitions() {
        use PurchaseOrderStatus::*;
        let allowed = [
            (Draft, Ordered),
            (Ordered, Received),
            (Draft, Cancelled),
            (Ordered, Cancelled),
        ];
        for from in PurchaseOrderStatus::ALL {
            for to in PurchaseOrderStatus::ALL {
                assert_eq!(from.can_transition_to(*to), allowed.contains(&(*from, *to)));
            }
        }
        assert!(Draft.is_editable());
        assert!(!Ordered.is_editable());
    }

    #[test]
    fn rejects_empty_and_duplicate_items() {
        let variant = Uuid::new_v4();
        let item = |qty| PurchaseOrderItemInput {
            variant_id: variant,
            quantity: qty,
            unit_cost: dec!(2.50),
        };
        let mut req = CreatePurchaseOrderRequest {
            reference: None,
            supplier_name: "Ceramics Co".into(),
            warehouse_id: Uuid::new_v4(),
            notes: None,
            expected_at: None,
            items: vec![],
        };
        assert!(req.validate().is_err());

        req.items = vec![item(5)];
        assert!(req.validate().is_ok());

        req.items = vec![item(5), item(3)];
        assert!(req.validate().is_err());

        req.items = vec![item(0)];
        assert!(req.validate().is_err());
    }
}
