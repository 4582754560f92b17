//! Product catalog domain types: products, variants, media and specifications

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::brands::{default_true, BrandSummary};
use super::{money_amount, valid_slug};
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

text_enum! {
    /// Product lifecycle status
    pub enum ProductStatus {
        Draft => "draft",
        Active => "active",
        Archived => "archived",
    }
}

impl Default for ProductStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl ProductStatus {
    pub fn can_transition_to(&self, next: ProductStatus) -> bool {
        use ProductStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Draft, Archived) | (Active, Archived) | (Archived, Draft)
        )
    }
}

/// Product row as listed
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductResponse {
    pub id: Uuid,
    pub brand_id: Option<Uuid>,
    pub brand_name: Option<String>,
    pub name: String,
    pub slug: String,
    pub sku: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ProductStatus,
    pub base_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub variant_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product with all of its owned collections
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub brand: Option<BrandSummary>,
    pub category_ids: Vec<Uuid>,
    pub variants: Vec<VariantResponse>,
    pub media: Vec<MediaResponse>,
    pub specifications: Vec<SpecificationResponse>,
}

fn compare_at_not_below_base(req: &CreateProductRequest) -> Result<(), ValidationError> {
    check_compare_at(Some(req.base_price), req.compare_at_price)
}

/// A compare-at price is a "was" price, so it may not undercut the base price.
pub fn check_compare_at(
    base_price: Option<Decimal>,
    compare_at_price: Option<Decimal>,
) -> Result<(), ValidationError> {
    match (base_price, compare_at_price) {
        (Some(base), Some(compare)) if compare < base => {
            let mut err = ValidationError::new("compare_at_price");
            err.message = Some("compare_at_price must not be below base_price".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "compare_at_not_below_base", skip_on_field_errors = false))]
pub struct CreateProductRequest {
    #[serde(default)]
    pub brand_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[validate(custom(function = "money_amount"))]
    pub base_price: Decimal,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateProductRequest {
    #[serde(default, with = "super::categories::double_option")]
    pub brand_id: Option<Option<Uuid>>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub base_price: Option<Decimal>,
    #[serde(default, with = "super::categories::double_option")]
    pub compare_at_price: Option<Option<Decimal>>,
    /// Replaces the full category assignment when present
    #[serde(default)]
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductStatusRequest {
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProductQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    /// Matches name or sku
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub brand_id: Option<Uuid>,
    /// Includes products in descendant categories
    #[serde(default, deserialize_with = "opt_from_str")]
    pub category_id: Option<Uuid>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub status: Option<ProductStatus>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub min_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub max_price: Option<Decimal>,
}

// ============================================================================
// Variants
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VariantResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub weight_grams: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = "money_amount"))]
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub weight_grams: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateVariantRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "money_amount"))]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub weight_grams: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

// ============================================================================
// Media
// ============================================================================

text_enum! {
    pub enum MediaType {
        Image => "image",
        Video => "video",
        Document => "document",
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::Image
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub url: String,
    pub alt_text: Option<String>,
    #[sqlx(try_from = "String")]
    pub media_type: MediaType,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMediaRequest {
    #[validate(url)]
    pub url: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReorderMediaRequest {
    #[validate(length(min = 1))]
    pub ids: Vec<Uuid>,
}

// ============================================================================
// Specifications
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpecificationResponse {
    pub id: Uuid,
    pub name: String,
    pub value: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SpecificationInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub value: String,
}

fn unique_spec_names(specs: &[SpecificationInput]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if spec.name.trim().is_empty() {
            let mut err = ValidationError::new("blank_name");
            err.message = Some("specification names must not be blank".into());
            return Err(err);
        }
        if !seen.insert(spec.name.trim().to_lowercase()) {
            let mut err = ValidationError::new("duplicate_name");
            err.message = Some(format!("duplicate specification '{}'", spec.name.trim()).into());
            return Err(err);
        }
    }
    Ok(())
}

/// A bare JSON array of `{name, value}` pairs, stored in the given order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(transparent)]
pub struct ReplaceSpecificationsRequest {
    #[validate(nested, custom(function = "unique_spec_names"), length(max = 200))]
    pub specifications: Vec<SpecificationInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_transitions() {
        use ProductStatus::*;
        let allowed = [(Draft, Active), (Draft, Archived), (Active, Archived), (Archived, Draft)];
        for from in ProductStatus::ALL {
            for to in ProductStatus::ALL {
                assert_eq!(
                    from.can_transition_to(*to),
                    allowed.contains(&(*from, *to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    fn product(base: Decimal, compare: Option<Decimal>) -> CreateProductRequest {
        CreateProductRequest {
            brand_id: None,
            name: "Espresso Cup".into(),
            slug: None,
            sku: "CUP-001".into(),
            description: None,
            status: ProductStatus::Draft,
            base_price: base,
            compare_at_price: compare,
            category_ids: vec![],
        }
    }

    #[test]
    fn compare_at_price_rule() {
        assert!(product(dec!(10), Some(dec!(12))).validate().is_ok());
        assert!(product(dec!(10), None).validate().is_ok());
        assert!(product(dec!(10), Some(dec!(9.99))).validate().is_err());
        assert!(product(dec!(-1), None).validate().is_err());
    }

    #[test]
    fn duplicate_spec_names_rejected() {
        let req = ReplaceSpecificationsRequest {
            specifications: vec![
                SpecificationInput {
                    name: "Material".into(),
                    value: "Porcelain".into(),
                },
                SpecificationInput {
                    name: " material ".into(),
                    value: "Glass".into(),
                },
            ],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn specifications_body_is_a_bare_array() {
        let req: ReplaceSpecificationsRequest =
            serde_json::from_str(r#"[{"name": "Material", "value": "Porcelain"}]"#).unwrap();
        assert_eq!(req.specifications.len(), 1);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_distinguishes_cleared_compare_price() {
        let req: UpdateProductRequest =
            serde_json::from_str(r#"{"compare_at_price": null}"#).unwrap();
        assert_eq!(req.compare_at_price, Some(None));
        let req: UpdateProductRequest = serde_json::from_str(r#"{"name": "Mug"}"#).unwrap();
        assert_eq!(req.compare_at_price, None);
    }
}
