//! Pagination and sorting utilities for list endpoints

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::query::opt_from_str;

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default, deserialize_with = "opt_from_str")]
    pub page: Option<u32>,

    /// Items per page
    #[serde(default, deserialize_with = "opt_from_str")]
    pub per_page: Option<u32>,
}

impl PaginationParams {
    /// Maximum allowed items per page
    pub const MAX_PER_PAGE: u32 = 100;
    pub const DEFAULT_PER_PAGE: u32 = 20;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Returns the clamped per_page value
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// Returns the page (1-indexed, minimum 1)
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// SQL OFFSET
    pub fn offset(&self) -> i64 {
        (i64::from(self.page()) - 1) * i64::from(self.per_page())
    }

    /// SQL LIMIT
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(params: &PaginationParams, total_items: u64) -> Self {
        let per_page = params.per_page();
        let page = params.page();
        let total_pages = total_items.div_ceil(u64::from(per_page)) as u32;

        Self {
            page,
            per_page,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> Paginated<T> {
    /// `total_items` comes straight from `COUNT(*)`, so negative values are clamped.
    pub fn new(data: Vec<T>, params: &PaginationParams, total_items: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(params, total_items.max(0) as u64),
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Sort query parameters; `sort` is only ever resolved through an allow-list.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SortParams {
    pub sort: Option<String>,
    pub order: Option<SortDirection>,
}

impl SortParams {
    /// Resolve to an `ORDER BY` fragment. `allowed` maps public sort keys to
    /// column expressions; unknown keys fall back to `default`.
    pub fn order_by(&self, allowed: &[(&str, &'static str)], default: &'static str) -> String {
        let column = self
            .sort
            .as_deref()
            .and_then(|key| {
                allowed
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key.trim()))
                    .map(|(_, column)| *column)
            })
            .unwrap_or(default);
        let direction = self.order.unwrap_or_default();
        format!("{} {}", column, direction.as_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_per_page() {
        let params = PaginationParams {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), 100);
        assert_eq!(params.offset(), 0);

        let params = PaginationParams {
            page: None,
            per_page: Some(0),
        };
        assert_eq!(params.per_page(), 1);
    }

    #[test]
    fn offset_uses_previous_pages() {
        let params = PaginationParams::new(3, 25);
        assert_eq!(params.offset(), 50);
        assert_eq!(params.limit(), 25);
    }

    #[test]
    fn meta_totals() {
        let meta = PaginationMeta::new(&PaginationParams::new(2, 20), 41);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let meta = PaginationMeta::new(&PaginationParams::new(3, 20), 41);
        assert!(!meta.has_next);

        let empty = PaginationMeta::new(&PaginationParams::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn paginated_clamps_negative_counts() {
        let page: Paginated<u8> = Paginated::new(vec![], &PaginationParams::default(), -4);
        assert_eq!(page.pagination.total_items, 0);
    }

    #[test]
    fn sort_resolves_through_allow_list() {
        let allowed = [("name", "p.name"), ("price", "p.base_price")];
        let params = SortParams {
            sort: Some("PRICE".into()),
            order: Some(SortDirection::Asc),
        };
        assert_eq!(params.order_by(&allowed, "p.created_at"), "p.base_price ASC");

        let injected = SortParams {
            sort: Some("name; DROP TABLE products".into()),
            order: None,
        };
        assert_eq!(
            injected.order_by(&allowed, "p.created_at"),
            "p.created_at DESC"
        );
    }
}
