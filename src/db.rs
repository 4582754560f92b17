//! Database connection pool management

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;

/// Give up connecting after this long.
const CONNECT_MAX_ELAPSED: Duration = Duration::from_secs(60);

/// Create a PostgreSQL connection pool, retrying while the database comes up.
pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(&settings.database_url)
        .context("Invalid DATABASE_URL")?
        .application_name("commerce-admin");

    let policy = ExponentialBackoff {
        max_elapsed_time: Some(CONNECT_MAX_ELAPSED),
        ..ExponentialBackoff::default()
    };

    let pool = backoff::future::retry(policy, || async {
        PgPoolOptions::new()
            .max_connections(settings.database_max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(connect_options.clone())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "PostgreSQL not reachable yet, retrying");
                backoff::Error::transient(e)
            })
    })
    .await
    .context("Failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        "Database connection pool established"
    );

    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Lightweight health check for database connectivity
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
