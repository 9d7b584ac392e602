//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`). Only required when `STOREFRONT_STORE=postgres`.
//! - `STOREFRONT_REDIS_URL` - Redis connection string. Only required when
//!   `STOREFRONT_CATALOG_CACHE=redis`.
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `STOREFRONT_STORE` - `postgres` or `memory` (default: postgres)
//! - `STOREFRONT_CATALOG_CACHE` - `redis` or `memory` (default: memory)
//! - `STOREFRONT_CATALOG_KEY` - Sorted-set key for the catalog (default: products)
//! - `STOREFRONT_CHECKOUT_TIMEOUT_MS` - Checkout reservation timeout (default: 5000)
//! - `STOREFRONT_DETAIL_CACHE_TTL_SECS` - Product detail cache TTL (default: 60)
//! - `STOREFRONT_SYNC_MAX_RETRIES` - Cache refresh attempts before marking the
//!   catalog stale (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Primary store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `PostgreSQL` with row-level locking.
    Postgres,
    /// In-process store for development and tests.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected `postgres` or `memory`, got `{other}`")),
        }
    }
}

/// Catalog cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Redis sorted set.
    Redis,
    /// In-process ordered map.
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected `redis` or `memory`, got `{other}`")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Which primary store to use
    pub store: StoreBackend,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Catalog cache configuration
    pub catalog: CatalogConfig,
    /// Upper bound on one checkout transaction
    pub checkout_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions sent to Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Catalog cache configuration.
///
/// Implements `Debug` manually to redact the Redis URL.
#[derive(Clone)]
pub struct CatalogConfig {
    /// Which cache backend to use
    pub backend: CacheBackend,
    /// Redis connection URL (may contain a password)
    pub redis_url: Option<SecretString>,
    /// Sorted-set key holding the catalog
    pub key: String,
    /// TTL for single-product detail reads
    pub detail_ttl: Duration,
    /// Attempts per cache refresh before giving up
    pub sync_max_retries: usize,
}

impl std::fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("backend", &self.backend)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("key", &self.key)
            .field("detail_ttl", &self.detail_ttl)
            .field("sync_max_retries", &self.sync_max_retries)
            .finish()
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: None,
            key: "products".to_string(),
            detail_ttl: Duration::from_secs(60),
            sync_max_retries: 5,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_env_or_default("STOREFRONT_BASE_URL", "http://localhost:3000");
        let store: StoreBackend = parse_env("STOREFRONT_STORE", "postgres")?;

        let database_url = match store {
            StoreBackend::Postgres => Some(get_database_url("STOREFRONT_DATABASE_URL")?),
            StoreBackend::Memory => None,
        };

        let catalog = CatalogConfig::from_env()?;
        let checkout_timeout =
            Duration::from_millis(parse_env("STOREFRONT_CHECKOUT_TIMEOUT_MS", "5000")?);
        if checkout_timeout.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_CHECKOUT_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            base_url,
            store,
            database_url,
            catalog,
            checkout_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// In-memory configuration for tests and local experiments.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            store: StoreBackend::Memory,
            database_url: None,
            catalog: CatalogConfig::default(),
            checkout_timeout: Duration::from_secs(5),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CatalogConfig {
    /// Load the catalog cache settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value fails to parse, or if the Redis backend
    /// is selected without `STOREFRONT_REDIS_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: CacheBackend = parse_env("STOREFRONT_CATALOG_CACHE", "memory")?;
        let redis_url = match backend {
            CacheBackend::Redis => Some(SecretString::from(get_required_env(
                "STOREFRONT_REDIS_URL",
            )?)),
            CacheBackend::Memory => None,
        };

        Ok(Self {
            backend,
            redis_url,
            key: get_env_or_default("STOREFRONT_CATALOG_KEY", "products"),
            detail_ttl: Duration::from_secs(parse_env("STOREFRONT_DETAIL_CACHE_TTL_SECS", "60")?),
            sync_max_retries: parse_env("STOREFRONT_SYNC_MAX_RETRIES", "5")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` naming `primary_key` if neither is set.
pub fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
