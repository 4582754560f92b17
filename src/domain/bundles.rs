//! Product bundles: several variants sold together at a discount

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::brands::default_true;
use super::{non_negative, valid_slug};
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BundleResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub discount_percent: Decimal,
    pub is_active: bool,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BundleItemResponse {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub variant_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BundlePricing {
    pub list_price: Decimal,
    pub bundle_price: Decimal,
    pub savings: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleDetail {
    #[serde(flatten)]
    pub bundle: BundleResponse,
    pub items: Vec<BundleItemResponse>,
    pub pricing: BundlePricing,
}

pub fn valid_percent(value: &Decimal) -> Result<(), ValidationError> {
    non_negative(value)?;
    if *value > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("percent");
        err.message = Some("must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BundleItemInput {
    pub variant_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

fn distinct_variants(items: &[BundleItemInput]) -> Result<(), ValidationError> {
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
pub struct CreateBundleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_percent"))]
    pub discount_percent: Decimal,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[validate(length(min = 1, max = 100), nested, custom(function = "distinct_variants"))]
    pub items: Vec<BundleItemInput>,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateBundleRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_percent"))]
    pub discount_percent: Option<Decimal>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    #[validate(length(min = 1, max = 100), nested, custom(function = "distinct_variants"))]
    pub items: Option<Vec<BundleItemInput>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BundleQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percent_bounds() {
        assert!(valid_percent(&dec!(0)).is_ok());
        assert!(valid_percent(&dec!(100)).is_ok());
        assert!(valid_percent(&dec!(100.01)).is_err());
        assert!(valid_percent(&dec!(-5)).is_err());
    }
}
