//! Category domain types
//!
//! Categories form a forest through `parent_id`. The flat rows are assembled
//! into [`CategoryNode`] trees by `services::category_tree`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::brands::default_true;
use super::valid_slug;
use crate::api::query::opt_from_str;
use crate::api::{PaginationParams, SortParams};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Node of the assembled category tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub position: i32,
    pub is_active: bool,
    pub depth: usize,
    /// Slugs from the root down to and including this node
    pub path: Vec<String>,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "valid_slug"))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub position: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// `parent_id` distinguishes "not sent" from an explicit `null` (move to root).
#[derive(Debug, Clone, Deserialize, Validate, Default)]
pub struct UpdateCategoryRequest {
    #[serde(default, with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
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
    #[validate(range(min = 0))]
    pub position: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CategoryQuery {
    #[serde(flatten)]
    pub pagination: PaginationParams,
    #[serde(flatten)]
    pub sort: SortParams,
    pub q: Option<String>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub parent_id: Option<Uuid>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CategoryTreeQuery {
    #[serde(default, deserialize_with = "opt_from_str")]
    pub include_inactive: Option<bool>,
}

/// Present-but-null vs absent for JSON patch fields
pub mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_id_absent_null_and_set() {
        let absent: UpdateCategoryRequest = serde_json::from_str(r#"{"name":"Mugs"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let to_root: UpdateCategoryRequest = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(to_root.parent_id, Some(None));

        let id = Uuid::new_v4();
        let moved: UpdateCategoryRequest =
            serde_json::from_str(&format!(r#"{{"parent_id":"{id}"}}"#)).unwrap();
        assert_eq!(moved.parent_id, Some(Some(id)));
    }
}
