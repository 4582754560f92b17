mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::Result;

use services::RedisCache;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting commerce admin backend"
    );

    // Create database pool
    let pool = db::create_pool(&settings).await?;
    if settings.database_run_migrations {
        db::run_migrations(&pool).await?;
    }

    if let Some(owner) = &settings.bootstrap_owner {
        auth::bootstrap::ensure_owner(&pool, owner).await?;
    }

    // Create Redis cache
    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;
    tracing::info!("Redis cache initialized");

    // Token service for admin sessions
    let tokens = auth::TokenService::new(
        &settings.jwt_secret,
        settings.jwt_issuer.clone(),
        settings.jwt_ttl_seconds,
    );

    // Create application state
    let state = app::AppState::new(pool, settings.clone(), tokens, cache);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
