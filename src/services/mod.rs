//! Service layer: caching, audit logging and the pure catalog logic the
//! route handlers delegate to.

pub mod audit;
pub mod cache;
pub mod category_tree;
pub mod pricing;
pub mod references;
pub mod slug;
pub mod spreadsheet;

pub use cache::RedisCache;
