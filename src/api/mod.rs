//! API response types, pagination and request extractors

pub mod extract;
pub mod pagination;
pub mod query;
pub mod response;

pub use extract::ValidatedJson;
pub use pagination::{Paginated, PaginationParams, SortParams};
pub use response::{Created, DataResponse, NoContent};
