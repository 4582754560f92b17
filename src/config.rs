use anyhow::{bail, Context, Result};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_run_migrations: bool,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Admin auth
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_ttl_seconds: i64,
    /// Seeds the first owner account when `admin_users` is empty
    pub bootstrap_owner: Option<BootstrapOwner>,

    // Catalog
    pub low_stock_threshold: i64,
    pub import_max_bytes: usize,
}

#[derive(Clone)]
pub struct BootstrapOwner {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapOwner")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Minimum accepted length of the HS256 signing secret.
const MIN_JWT_SECRET_LEN: usize = 32;

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_key<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        let env = Environment::parse(&lookup("ENV").unwrap_or_else(|| "dev".to_string()));
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        // Database
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_key(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let database_run_migrations = lookup("DATABASE_RUN_MIGRATIONS")
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // Redis
        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| "redis://redis:6379/0".to_string());
        let redis_cache_ttl_seconds = parse_key(&lookup, "REDIS_CACHE_TTL_SECONDS").unwrap_or(300);

        // CORS
        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Admin auth
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes");
        }
        let jwt_issuer = lookup("JWT_ISSUER").unwrap_or_else(|| "commerce-admin".to_string());
        let jwt_ttl_seconds = parse_key(&lookup, "JWT_TTL_SECONDS").unwrap_or(8 * 3600); // one shift
        let bootstrap_owner = match (lookup("BOOTSTRAP_OWNER_EMAIL"), lookup("BOOTSTRAP_OWNER_PASSWORD")) {
            (Some(email), Some(password)) if !email.trim().is_empty() => Some(BootstrapOwner {
                email: email.trim().to_lowercase(),
                password,
            }),
            (Some(_), None) => bail!("BOOTSTRAP_OWNER_PASSWORD must be set with BOOTSTRAP_OWNER_EMAIL"),
            _ => None,
        };

        // Catalog
        let low_stock_threshold = parse_key(&lookup, "LOW_STOCK_THRESHOLD").unwrap_or(5);
        let import_max_bytes = parse_key(&lookup, "IMPORT_MAX_BYTES").unwrap_or(10 * 1024 * 1024);

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            database_run_migrations,
            redis_url,
            redis_cache_ttl_seconds,
            cors_allow_origins,
            jwt_secret,
            jwt_issuer,
            jwt_ttl_seconds,
            bootstrap_owner,
            low_stock_threshold,
            import_max_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", SECRET),
        ]))
        .unwrap();

        assert_eq!(settings.env, Environment::Dev);
        assert_eq!(settings.server_addr, "0.0.0.0:8080");
        assert_eq!(settings.database_max_connections, 10);
        assert!(!settings.database_run_migrations);
        assert_eq!(settings.cors_allow_origins, vec!["http://localhost:3000"]);
        assert_eq!(settings.jwt_ttl_seconds, 28_800);
        assert_eq!(settings.low_stock_threshold, 5);
        assert_eq!(settings.import_max_bytes, 10 * 1024 * 1024);
        assert!(settings.bootstrap_owner.is_none());
    }

    #[test]
    fn bootstrap_owner_needs_both_keys() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("JWT_SECRET", SECRET),
            ("BOOTSTRAP_OWNER_EMAIL", " Owner@Example.com "),
            ("BOOTSTRAP_OWNER_PASSWORD", "a long enough password"),
        ]))
        .unwrap();
        let owner = settings.bootstrap_owner.unwrap();
        assert_eq!(owner.email, "owner@example.com");
        assert!(!format!("{owner:?}").contains("long enough"));

        let err = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("JWT_SECRET", SECRET),
            ("BOOTSTRAP_OWNER_EMAIL", "owner@example.com"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BOOTSTRAP_OWNER_PASSWORD"));
    }

    #[test]
    fn parses_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ENV", "Production"),
            ("DATABASE_URL", "postgres://db/shop"),
            ("DATABASE_RUN_MIGRATIONS", "true"),
            ("CORS_ALLOW_ORIGINS", "https://a.example, ,https://b.example"),
            ("JWT_SECRET", SECRET),
            ("LOW_STOCK_THRESHOLD", "12"),
        ]))
        .unwrap();

        assert!(settings.env.is_prod());
        assert!(settings.database_run_migrations);
        assert_eq!(
            settings.cors_allow_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(settings.low_stock_threshold, 12);
    }

    #[test]
    fn rejects_missing_database_url() {
        let err = Settings::from_lookup(lookup_from(&[("JWT_SECRET", SECRET)])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn rejects_short_jwt_secret() {
        let err = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("JWT_SECRET", "short"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }
}
