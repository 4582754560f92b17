//! Spreadsheet exports

use axum::{
    extract::{Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::query::opt_from_str;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::audit::{AdminAction, AuditTargetType};
use crate::domain::orders::OrderStatus;
use crate::error::{ApiError, Module, Operation, ResultExt};
use crate::services::audit;
use crate::services::spreadsheet::export::write_workbook;
use crate::services::spreadsheet::{ExportCell, SheetExport, XLSX_CONTENT_TYPE};

#[derive(Debug, Deserialize, Default)]
pub struct OrderExportQuery {
    #[serde(default, deserialize_with = "opt_from_str")]
    pub status: Option<OrderStatus>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub placed_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_from_str")]
    pub placed_to: Option<DateTime<Utc>>,
}

fn yes_no(value: bool) -> ExportCell {
    ExportCell::from(if value { "yes" } else { "no" })
}

/// Render the sheet off the async runtime and wrap it as a download.
async fn xlsx_response(sheet: SheetExport) -> Result<impl IntoResponse, ApiError> {
    let (m, op) = (Module::Exports, Operation::Export);
    let file_name = sheet.file_name();
    let bytes = tokio::task::spawn_blocking(move || write_workbook(&sheet))
        .await
        .map_err(|e| ApiError::internal(e.to_string()).in_scope(m, op))?
        .map_err(|e| ApiError::internal(e.to_string()).in_scope(m, op))?;

    Ok((
        [
            (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        bytes,
    ))
}

/// GET /exports/products.xlsx
pub async fn export_products(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Exports;

    type Row = (
        String,
        String,
        Option<String>,
        Option<String>,
        String,
        Decimal,
        Option<Decimal>,
        i64,
        DateTime<Utc>,
    );
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT p.sku, p.name, b.name,
               (SELECT STRING_AGG(c.name, ', ' ORDER BY c.name)
                FROM product_categories pc JOIN categories c ON c.id = pc.category_id
                WHERE pc.product_id = p.id),
               p.status, p.base_price, p.compare_at_price,
               (SELECT COUNT(*) FROM product_variants v WHERE v.product_id = p.id),
               p.created_at
        FROM products p
        LEFT JOIN brands b ON b.id = p.brand_id
        ORDER BY p.sku
        "#,
    )
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::Export)?;

    let mut sheet = SheetExport::new(
        "products",
        vec![
            "SKU",
            "Name",
            "Brand",
            "Categories",
            "Status",
            "Base Price",
            "Compare At Price",
            "Variants",
            "Created",
        ],
    );
    let count = rows.len();
    for (sku, name, brand, categories, status, base, compare_at, variants, created) in rows {
        sheet.push(vec![
            sku.into(),
            name.into(),
            brand.into(),
            categories.into(),
            status.into(),
            base.into(),
            compare_at.into(),
            variants.into(),
            created.into(),
        ]);
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Export,
        AuditTargetType::Product,
        None,
        serde_json::json!({ "rows": count }),
    )
    .await;

    xlsx_response(sheet).await
}

/// GET /exports/customers.xlsx
pub async fn export_customers(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Exports;

    type Row = (
        String,
        String,
        String,
        Option<String>,
        bool,
        i64,
        Decimal,
        DateTime<Utc>,
    );
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT c.email, c.first_name, c.last_name, c.phone, c.is_active,
               (SELECT COUNT(*) FROM orders o WHERE o.customer_id = c.id),
               COALESCE((SELECT SUM(o.grand_total) FROM orders o
                         WHERE o.customer_id = c.id AND o.status <> 'cancelled'), 0),
               c.created_at
        FROM customers c
        ORDER BY c.email
        "#,
    )
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::Export)?;

    let mut sheet = SheetExport::new(
        "customers",
        vec![
            "Email",
            "First Name",
            "Last Name",
            "Phone",
            "Active",
            "Orders",
            "Lifetime Value",
            "Created",
        ],
    );
    let count = rows.len();
    for (email, first, last, phone, active, orders, value, created) in rows {
        sheet.push(vec![
            email.into(),
            first.into(),
            last.into(),
            phone.into(),
            yes_no(active),
            orders.into(),
            value.into(),
            created.into(),
        ]);
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Export,
        AuditTargetType::Customer,
        None,
        serde_json::json!({ "rows": count }),
    )
    .await;

    xlsx_response(sheet).await
}

/// GET /exports/orders.xlsx
pub async fn export_orders(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let m = Module::Exports;

    type Row = (
        String,
        String,
        String,
        String,
        Decimal,
        Decimal,
        Decimal,
        Decimal,
        Decimal,
        DateTime<Utc>,
    );
    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT o.order_number, c.email, o.status, o.currency, o.subtotal, o.discount_total,
               o.shipping_total, o.tax_total, o.grand_total, o.placed_at
        FROM orders o
        JOIN customers c ON c.id = o.customer_id
        WHERE ($1::text IS NULL OR o.status = $1)
          AND ($2::timestamptz IS NULL OR o.placed_at >= $2)
          AND ($3::timestamptz IS NULL OR o.placed_at < $3)
        ORDER BY o.placed_at DESC, o.order_number
        "#,
    )
    .bind(query.status.map(|s| s.as_str()))
    .bind(query.placed_from)
    .bind(query.placed_to)
    .fetch_all(&state.db)
    .await
    .scoped(m, Operation::Export)?;

    let mut sheet = SheetExport::new(
        "orders",
        vec![
            "Order Number",
            "Customer Email",
            "Status",
            "Currency",
            "Subtotal",
            "Discount",
            "Shipping",
            "Tax",
            "Grand Total",
            "Placed At",
        ],
    );
    let count = rows.len();
    for (number, email, status, currency, subtotal, discount, shipping, tax, grand, placed) in rows {
        sheet.push(vec![
            number.into(),
            email.into(),
            status.into(),
            currency.into(),
            subtotal.into(),
            discount.into(),
            shipping.into(),
            tax.into(),
            grand.into(),
            placed.into(),
        ]);
    }

    audit::record(
        &state.db,
        auth.user_id,
        AdminAction::Export,
        AuditTargetType::Order,
        None,
        serde_json::json!({
            "rows": count,
            "status": query.status,
            "placed_from": query.placed_from,
            "placed_to": query.placed_to,
        }),
    )
    .await;

    xlsx_response(sheet).await
}
