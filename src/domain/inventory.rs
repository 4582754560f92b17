//! Warehouses and per-warehouse stock levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::brands::default_true;
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WarehouseResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uppercase letters, digits and dashes, 2 to 16 characters.
pub fn valid_warehouse_code(code: &str) -> Result<(), ValidationError> {
    let ok = (2..=16).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("warehouse_code");
        err.message = Some("must be 2-16 uppercase letters, digits or dashes".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWarehouseRequest {
    #[validate(custom(function = "valid_warehouse_code"))]
    pub code: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub city: Option<String>,
    #[serde(default)]
    #[validate(length(min = 2, max = 2, message = "must be an ISO 3166-1 alpha-2 code"))]
    pub country: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateWarehouseRequest {
    #[serde(default)]
    #[validate(custom(function = "valid_warehouse_code"))]
    pub code: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub city: Option<String>,
    #[serde(default)]
    #[validate(length(min = 2, max = 2, message = "must be an ISO 3166-1 alpha-2 code"))]
    pub country: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WarehouseQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub is_active: Option<bool>,
}

/// Stock of one variant in one warehouse
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryLevel {
    pub warehouse_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub variant_name: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub reserved: i32,
    pub available: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventoryQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    /// Matches sku or variant name
    pub q: Option<String>,
    /// Only rows whose available quantity is at or below this value
    #[serde(default, deserialize_with = "opt_from_str")]
    pub max_available: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub variant_id: Uuid,
    #[validate(range(min = -1_000_000, max = 1_000_000))]
    pub delta: i32,
    #[validate(length(min = 1, max = 300))]
    pub reason: String,
}

/// Why a stock adjustment cannot be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    BelowZero { quantity: i32, delta: i32 },
    BelowReserved { resulting: i32, reserved: i32 },
    TooLarge { quantity: i32, delta: i32 },
}

impl std::fmt::Display for StockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowZero { quantity, delta } => {
                write!(f, "Adjusting {quantity} by {delta} would make stock negative")
            }
            Self::TooLarge { quantity, delta } => {
                write!(f, "Adjusting {quantity} by {delta} exceeds the largest storable stock level")
            }
            Self::BelowReserved {
                resulting,
                reserved,
            } => write!(
                f,
                "Resulting stock {resulting} would be below the {reserved} units reserved"
            ),
        }
    }
}

/// Quantity after applying `delta`, keeping stock non-negative and covering reservations.
pub fn apply_stock_delta(quantity: i32, reserved: i32, delta: i32) -> Result<i32, StockError> {
    let resulting = quantity
        .checked_add(delta)
        .ok_or(StockError::TooLarge { quantity, delta })?;
    if resulting < 0 {
        return Err(StockError::BelowZero { quantity, delta });
    }
    if resulting < reserved {
        return Err(StockError::BelowReserved {
            resulting,
            reserved,
        });
    }
    Ok(resulting)
}

/// Stock of one variant summed across warehouses
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockSummary {
    pub variant_id: Uuid,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub warehouses: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10, 0, -3, Ok(7))]
    #[case(10, 0, -10, Ok(0))]
    #[case(2, 0, -3, Err(StockError::BelowZero { quantity: 2, delta: -3 }))]
    #[case(10, 6, -5, Err(StockError::BelowReserved { resulting: 5, reserved: 6 }))]
    #[case(0, 0, 25, Ok(25))]
    #[case(i32::MAX - 5, 0, 10, Err(StockError::TooLarge { quantity: i32::MAX - 5, delta: 10 }))]
    #[case(i32::MAX - 5, 0, 5, Ok(i32::MAX))]
    fn stock_delta(
        #[case] quantity: i32,
        #[case] reserved: i32,
        #[case] delta: i32,
        #[case] expected: Result<i32, StockError>,
    ) {
        assert_eq!(apply_stock_delta(quantity, reserved, delta), expected);
    }

    #[rstest]
    #[case("MAIN", true)]
    #[case("EU-WEST-1", true)]
    #[case("x", false)]
    #[case("main", false)]
    #[case("A-VERY-LONG-CODE-17", false)]
    fn warehouse_codes(#[case] code: &str, #[case] ok: bool) {
        assert_eq!(valid_warehouse_code(code).is_ok(), ok);
    }
}
