//! Unified API error handling
//!
//! Every failure leaves the API in the same envelope. Errors can carry an
//! [`ErrorScope`] naming the module and operation they came from; the level
//! is derived from the HTTP status so logs and clients agree on severity.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Functional area an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Auth,
    AdminUsers,
    Brands,
    Categories,
    Products,
    Variants,
    Media,
    Specifications,
    Inventory,
    Warehouses,
    PurchaseOrders,
    Bundles,
    Customers,
    Wishlists,
    Orders,
    Imports,
    Exports,
    Dashboard,
    Audit,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AdminUsers => "admin_users",
            Self::Brands => "brands",
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Variants => "variants",
            Self::Media => "media",
            Self::Specifications => "specifications",
            Self::Inventory => "inventory",
            Self::Warehouses => "warehouses",
            Self::PurchaseOrders => "purchase_orders",
            Self::Bundles => "bundles",
            Self::Customers => "customers",
            Self::Wishlists => "wishlists",
            Self::Orders => "orders",
            Self::Imports => "imports",
            Self::Exports => "exports",
            Self::Dashboard => "dashboard",
            Self::Audit => "audit",
        }
    }
}

/// Operation being performed when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
    Import,
    Export,
    Transition,
    Login,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
            Self::Export => "export",
            Self::Transition => "transition",
            Self::Login => "login",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Info,
    Warn,
    Error,
}

impl ErrorLevel {
    pub fn for_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::Error
        } else if status == StatusCode::NOT_FOUND {
            Self::Info
        } else {
            Self::Warn
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorScope {
    pub module: Module,
    pub operation: Operation,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("{source}")]
    Scoped {
        scope: ErrorScope,
        source: Box<ApiError>,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScopeBody {
    pub module: Module,
    pub operation: Operation,
    pub level: ErrorLevel,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            scope: None,
            reference: None,
        }
    }
}

/// Postgres SQLSTATE codes the API translates into client errors.
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_CHECK_VIOLATION: &str = "23514";

/// Tables whose auto-named constraints (`<table>_<column>_key`, `_check`,
/// `_fkey`) are translated back to a field name. Longest first.
const CONSTRAINT_TABLES: &[&str] = &[
    "product_specifications",
    "purchase_order_items",
    "product_categories",
    "product_variants",
    "purchase_orders",
    "admin_audit_log",
    "wishlist_items",
    "product_media",
    "bundle_items",
    "admin_users",
    "order_items",
    "categories",
    "warehouses",
    "customers",
    "inventory",
    "products",
    "bundles",
    "brands",
    "orders",
];

/// Public field name behind a constraint from the schema, when it names one.
pub fn constraint_field(constraint: &str) -> Option<&str> {
    if constraint == "idx_product_specifications_name" {
        return Some("name");
    }
    let stem = constraint
        .strip_suffix("_fkey")
        .or_else(|| constraint.strip_suffix("_key"))
        .or_else(|| constraint.strip_suffix("_check"))?;
    let table = CONSTRAINT_TABLES.iter().find(|t| stem.starts_with(**t))?;
    stem[table.len()..]
        .strip_prefix('_')
        .filter(|column| !column.is_empty())
}

/// Field behind a violated constraint, if the error is one.
pub fn violated_field(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.constraint())
        .and_then(constraint_field)
        .map(str::to_string)
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::Unprocessable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Attach a scope unless one is already present; the innermost scope wins.
    pub fn in_scope(self, module: Module, operation: Operation) -> Self {
        match self {
            scoped @ Self::Scoped { .. } => scoped,
            other => Self::Scoped {
                scope: ErrorScope { module, operation },
                source: Box::new(other),
            },
        }
    }

    pub fn scope(&self) -> Option<ErrorScope> {
        match self {
            Self::Scoped { scope, .. } => Some(*scope),
            _ => None,
        }
    }

    fn pg_code(err: &sqlx::Error) -> Option<String> {
        err.as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.into_owned())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            Self::Database(e) => match Self::pg_code(e).as_deref() {
                Some(PG_UNIQUE_VIOLATION) | Some(PG_FOREIGN_KEY_VIOLATION) => StatusCode::CONFLICT,
                Some(PG_CHECK_VIOLATION) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Scoped { source, .. } => source.status_code(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Unprocessable(_) => "UNPROCESSABLE_ENTITY",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(sqlx::Error::RowNotFound) => "NOT_FOUND",
            Self::Database(e) => match Self::pg_code(e).as_deref() {
                Some(PG_UNIQUE_VIOLATION) => "DUPLICATE_VALUE",
                Some(PG_FOREIGN_KEY_VIOLATION) => "REFERENCE_VIOLATION",
                Some(PG_CHECK_VIOLATION) => "CONSTRAINT_VIOLATION",
                _ => "DATABASE_ERROR",
            },
            Self::Scoped { source, .. } => source.error_code(),
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Unprocessable(msg) => msg.clone(),
            Self::Validation(_) => "Request validation failed".to_string(),
            Self::Database(sqlx::Error::RowNotFound) => "Record not found".to_string(),
            Self::Database(e) => {
                let field = violated_field(e);
                match (Self::pg_code(e).as_deref(), field) {
                    (Some(PG_UNIQUE_VIOLATION), Some(field)) => {
                        format!("A record with this {field} already exists")
                    }
                    (Some(PG_UNIQUE_VIOLATION), None) => {
                        "A record with this value already exists".to_string()
                    }
                    (Some(PG_FOREIGN_KEY_VIOLATION), _) => {
                        "Referenced record is missing or still in use".to_string()
                    }
                    (Some(PG_CHECK_VIOLATION), Some(field)) => format!("Invalid value for {field}"),
                    (Some(PG_CHECK_VIOLATION), None) => {
                        "A value was rejected by a data rule".to_string()
                    }
                    _ => "An internal error occurred".to_string(),
                }
            }
            // Don't leak internal error details
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Scoped { source, .. } => source.public_message(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(errors) => serde_json::to_value(errors).ok(),
            Self::Scoped { source, .. } => source.details(),
            _ => None,
        }
    }

    /// Underlying error with any scope wrappers removed.
    pub fn root(&self) -> &ApiError {
        match self {
            Self::Scoped { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        let status = self.status_code();
        let level = ErrorLevel::for_status(status);
        let scope = self.scope();

        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
            details: self.details(),
            reference: scope.map(|s| {
                format!(
                    "{}.{}.{}",
                    s.module.as_str(),
                    s.operation.as_str(),
                    level.as_str()
                )
            }),
            scope: scope.map(|s| ScopeBody {
                module: s.module,
                operation: s.operation,
                level,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let level = ErrorLevel::for_status(status);
        let module = self.scope().map(|s| s.module.as_str()).unwrap_or("-");
        let operation = self.scope().map(|s| s.operation.as_str()).unwrap_or("-");

        match (level, self.root()) {
            (ErrorLevel::Error, ApiError::Internal(e)) => {
                tracing::error!(module, operation, error = ?e, "Internal server error");
            }
            (ErrorLevel::Error, ApiError::Database(e)) => {
                tracing::error!(module, operation, error = ?e, "Database error");
            }
            (ErrorLevel::Error, root) => {
                tracing::error!(module, operation, error = %root, "API error");
            }
            (ErrorLevel::Warn, root) => {
                tracing::warn!(module, operation, error = %root, "API error");
            }
            (ErrorLevel::Info, root) => {
                tracing::info!(module, operation, error = %root, "API error");
            }
        }

        (status, Json(self.to_body())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Attach a module/operation scope to any error convertible into [`ApiError`].
pub trait ResultExt<T> {
    fn scoped(self, module: Module, operation: Operation) -> ApiResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ApiError>,
{
    fn scoped(self, module: Module, operation: Operation) -> ApiResult<T> {
        self.map_err(|e| e.into().in_scope(module, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn level_follows_status_class() {
        assert_eq!(ErrorLevel::for_status(StatusCode::NOT_FOUND), ErrorLevel::Info);
        assert_eq!(ErrorLevel::for_status(StatusCode::CONFLICT), ErrorLevel::Warn);
        assert_eq!(
            ErrorLevel::for_status(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorLevel::Error
        );
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let err = ApiError::internal("connection string postgres://secret");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn constraints_translate_to_field_names() {
        assert_eq!(constraint_field("products_sku_key"), Some("sku"));
        assert_eq!(constraint_field("product_variants_sku_key"), Some("sku"));
        assert_eq!(constraint_field("customers_email_key"), Some("email"));
        assert_eq!(constraint_field("orders_customer_id_fkey"), Some("customer_id"));
        assert_eq!(constraint_field("inventory_quantity_check"), Some("quantity"));
        assert_eq!(constraint_field("idx_product_specifications_name"), Some("name"));
        // table-level rules and unknown names stay anonymous
        assert_eq!(constraint_field("products_check"), None);
        assert_eq!(constraint_field("inventory_pkey"), None);
        assert_eq!(constraint_field("some_external_thing"), None);
    }

    #[test]
    fn innermost_scope_wins() {
        let err = ApiError::not_found("Product not found")
            .in_scope(Module::Variants, Operation::Get)
            .in_scope(Module::Products, Operation::Update);
        let scope = err.scope().unwrap();
        assert_eq!(scope.module, Module::Variants);
        assert_eq!(scope.operation, Operation::Get);
    }

    #[test]
    fn scoped_result_extension() {
        let result: Result<(), ApiError> = Err(ApiError::conflict("Slug taken"));
        let err = result.scoped(Module::Brands, Operation::Create).unwrap_err();
        let body = err.to_body();
        assert_eq!(body.code, "CONFLICT");
        assert_eq!(body.reference.as_deref(), Some("brands.create.warn"));
        assert_eq!(body.scope.unwrap().level, ErrorLevel::Warn);
    }

    #[test]
    fn validation_errors_carry_details() {
        let errors = Named {
            name: String::new(),
        }
        .validate()
        .unwrap_err();
        let err = ApiError::from(errors);
        let body = err.to_body();
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert!(body.details.unwrap().get("name").is_some());
    }

    #[tokio::test]
    async fn response_envelope_shape() {
        let response = ApiError::unprocessable("Invalid status transition")
            .in_scope(Module::Orders, Operation::Transition)
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], "UNPROCESSABLE_ENTITY");
        assert_eq!(json["message"], "Invalid status transition");
        assert_eq!(json["scope"]["module"], "orders");
        assert_eq!(json["scope"]["operation"], "transition");
        assert_eq!(json["scope"]["level"], "warn");
        assert_eq!(json["reference"], "orders.transition.warn");
    }
}
