//! Redis read-through cache for expensive catalog reads.
//!
//! Cache failures never fail a request: reads degrade to a miss and writes
//! are logged and dropped.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Redis cache client backed by a reconnecting `ConnectionManager`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        let hit = match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable cached value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Redis get failed");
                None
            }
        };

        tracing::Span::current().record("cache_hit", hit.is_some());
        hit
    }

    #[instrument(skip(self, value))]
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Return the cached value for `key`, or compute it with `load` and store it.
    ///
    /// Loader errors propagate; cache errors only cost a reload.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = load().await?;
        if let Err(e) = self.set_with_ttl(key, &value, ttl).await {
            warn!(key, error = %e, "Failed to populate cache");
        }
        Ok(value)
    }

    /// Delete all keys matching a glob pattern, walking the full SCAN cursor.
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;

            if !keys.is_empty() {
                let removed: i32 = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += removed.max(0) as usize;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, deleted, "Cache pattern delete");
        Ok(deleted)
    }

    /// Best-effort invalidation used after writes.
    pub async fn invalidate(&self, pattern: &str) {
        if let Err(e) = self.delete_pattern(pattern).await {
            warn!(pattern, error = %e, "Cache invalidation failed");
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders for consistent key formats.
pub mod keys {
    /// Full category tree, keyed by whether inactive nodes are included
    pub fn category_tree(include_inactive: bool) -> String {
        format!("categories:tree:inactive:{}", include_inactive)
    }

    /// Pattern covering every cached category tree
    pub fn category_tree_pattern() -> &'static str {
        "categories:tree:*"
    }

    /// Dashboard statistics snapshot
    pub fn dashboard_stats() -> &'static str {
        "dashboard:stats"
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn tree_keys_fall_under_pattern() {
        let prefix = keys::category_tree_pattern().trim_end_matches('*');
        assert!(keys::category_tree(true).starts_with(prefix));
        assert!(keys::category_tree(false).starts_with(prefix));
        assert_ne!(keys::category_tree(true), keys::category_tree(false));
    }
}
