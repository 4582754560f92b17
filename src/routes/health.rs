use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: &'static str,
    pub redis: &'static str,
}

/// Overall status and HTTP code for the two dependency checks. The database
/// is critical; the cache only degrades the service.
pub fn overall_status(db_ok: bool, redis_ok: bool) -> (&'static str, StatusCode) {
    match (db_ok, redis_ok) {
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    }
}

fn label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    // Check all services in parallel
    let (db_ok, redis_result) = tokio::join!(db::health_check(&state.db), state.cache.health_check());
    let redis_ok = redis_result.is_ok();

    let (status, status_code) = overall_status(db_ok, redis_ok);
    if status_code != StatusCode::OK {
        tracing::error!(database = db_ok, redis = redis_ok, "Health check failed");
    }

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceHealth {
                database: label(db_ok),
                redis: label(redis_ok),
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, true, "healthy", StatusCode::OK)]
    #[case(true, false, "degraded", StatusCode::OK)]
    #[case(false, true, "unhealthy", StatusCode::SERVICE_UNAVAILABLE)]
    #[case(false, false, "unhealthy", StatusCode::SERVICE_UNAVAILABLE)]
    fn status_matrix(
        #[case] db_ok: bool,
        #[case] redis_ok: bool,
        #[case] status: &str,
        #[case] code: StatusCode,
    ) {
        assert_eq!(overall_status(db_ok, redis_ok), (status, code));
    }
}
