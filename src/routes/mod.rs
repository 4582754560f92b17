pub mod admin_users;
pub mod audit_log;
pub mod auth;
pub mod brands;
pub mod bundles;
pub mod categories;
pub mod customers;
pub mod dashboard;
pub mod exports;
pub mod health;
pub mod imports;
pub mod media;
pub mod orders;
pub mod products;
pub mod purchase_orders;
pub mod specifications;
pub mod variants;
pub mod warehouses;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/auth/login", post(auth::login))
        // Current admin and admin management
        .route("/me", get(auth::me))
        .route(
            "/admin-users",
            get(admin_users::list_admin_users).post(admin_users::create_admin_user),
        )
        .route("/admin-users/:id", patch(admin_users::update_admin_user))
        // Brands
        .route("/brands", get(brands::list_brands).post(brands::create_brand))
        .route(
            "/brands/:id",
            get(brands::get_brand)
                .patch(brands::update_brand)
                .delete(brands::delete_brand),
        )
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route("/categories/tree", get(categories::get_category_tree))
        .route(
            "/categories/:id",
            get(categories::get_category)
                .patch(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/categories/:id/descendants",
            get(categories::category_descendants),
        )
        // Products and their owned collections
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/:id/status", post(products::set_product_status))
        .route(
            "/products/:id/variants",
            get(variants::list_variants).post(variants::create_variant),
        )
        .route(
            "/products/:id/variants/:variant_id",
            patch(variants::update_variant).delete(variants::delete_variant),
        )
        .route(
            "/products/:id/media",
            get(media::list_media).post(media::add_media),
        )
        .route("/products/:id/media/order", put(media::reorder_media))
        .route(
            "/products/:id/media/:media_id",
            delete(media::delete_media),
        )
        .route(
            "/products/:id/specifications",
            put(specifications::replace_specifications),
        )
        .route("/variants/:id/stock", get(variants::variant_stock))
        // Warehouses and inventory
        .route(
            "/warehouses",
            get(warehouses::list_warehouses).post(warehouses::create_warehouse),
        )
        .route(
            "/warehouses/:id",
            get(warehouses::get_warehouse)
                .patch(warehouses::update_warehouse)
                .delete(warehouses::delete_warehouse),
        )
        .route("/warehouses/:id/inventory", get(warehouses::list_inventory))
        .route(
            "/warehouses/:id/inventory/adjust",
            post(warehouses::adjust_inventory),
        )
        // Purchase orders
        .route(
            "/purchase-orders",
            get(purchase_orders::list_purchase_orders)
                .post(purchase_orders::create_purchase_order),
        )
        .route(
            "/purchase-orders/:id",
            get(purchase_orders::get_purchase_order)
                .patch(purchase_orders::update_purchase_order),
        )
        .route(
            "/purchase-orders/:id/status",
            post(purchase_orders::set_purchase_order_status),
        )
        // Bundles
        .route(
            "/bundles",
            get(bundles::list_bundles).post(bundles::create_bundle),
        )
        .route(
            "/bundles/:id",
            get(bundles::get_bundle)
                .patch(bundles::update_bundle)
                .delete(bundles::delete_bundle),
        )
        // Customers and wishlists
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/customers/:id",
            get(customers::get_customer)
                .patch(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route(
            "/customers/:id/wishlist",
            get(customers::get_wishlist).post(customers::add_to_wishlist),
        )
        .route(
            "/customers/:id/wishlist/:product_id",
            delete(customers::remove_from_wishlist),
        )
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/orders/:id",
            get(orders::get_order).delete(orders::delete_order),
        )
        .route("/orders/:id/status", post(orders::set_order_status))
        // Spreadsheets
        .route("/imports/products", post(imports::import_products))
        .route("/exports/products.xlsx", get(exports::export_products))
        .route("/exports/customers.xlsx", get(exports::export_customers))
        .route("/exports/orders.xlsx", get(exports::export_orders))
        // Reporting
        .route("/dashboard/stats", get(dashboard::get_dashboard_stats))
        .route("/audit-log", get(audit_log::list_audit_log))
}
