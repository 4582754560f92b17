//! Brand domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::valid_slug;
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrandResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimal brand reference embedded in product payloads
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrandSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBrandRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub logo_url: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub website_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBrandRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub logo_url: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BrandQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    /// Case-insensitive match on name
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub is_active: Option<bool>,
}

pub(crate) fn default_true() -> bool {
    true
}
