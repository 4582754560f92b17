use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenService;
use crate::config::Settings;
use crate::middleware::request_id::X_REQUEST_ID;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::RedisCache;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub tokens: TokenService,
    pub cache: RedisCache,
}

impl AppState {
    pub fn new(db: PgPool, settings: Settings, tokens: TokenService, cache: RedisCache) -> Arc<Self> {
        Arc::new(Self {
            db,
            settings,
            tokens,
            cache,
        })
    }
}

/// Router with the full middleware stack.
///
/// Layers apply bottom-up: CORS sees the request first, then the request id
/// is assigned so the trace span can carry it.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let request_id = req
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::debug_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                request_id,
            )
        })
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    // Spreadsheet uploads are the largest bodies the API accepts
    let body_limit = DefaultBodyLimit::max(state.settings.import_max_bytes);

    Router::new()
        .merge(routes::api_router())
        .layer(body_limit)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn allowed_origins(settings: &Settings) -> Vec<HeaderValue> {
    settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect()
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let max_age = if settings.env.is_dev() {
        Duration::from_secs(24 * 3600)
    } else {
        Duration::from_secs(3600)
    };
    let request_id = HeaderName::from_static(X_REQUEST_ID);

    CorsLayer::new()
        .allow_origin(allowed_origins(settings))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            request_id.clone(),
        ]))
        // Export downloads need the file name visible to browser clients
        .expose_headers([request_id, header::CONTENT_DISPOSITION])
        .allow_credentials(true)
        .max_age(max_age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_origins_are_dropped() {
        let mut settings = Settings::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/commerce".to_string()),
            "JWT_SECRET" => Some("x".repeat(32)),
            _ => None,
        })
        .unwrap();
        settings.cors_allow_origins = vec![
            "https://admin.example.com".to_string(),
            "bad\norigin".to_string(),
        ];

        let origins = allowed_origins(&settings);
        assert_eq!(origins, [HeaderValue::from_static("https://admin.example.com")]);
    }
}
