//! Configuration for ResourceStore
//!
//! Provides a builder pattern for configuring the store and its HTTP surface.

use crate::error::{Result, StoreError};
use crate::sql::sanitize::validate_identifier;

/// Default number of resources returned per page
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Upper bound on `page[limit]`
pub const MAX_PAGE_LIMIT: i64 = 250;

/// Configuration for the resource store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// PostgreSQL schema the retail tables live in (default: "public")
    pub namespace: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Page size used when the request does not specify one
    pub default_page_limit: i64,
    /// Largest page size a request may ask for
    pub max_page_limit: i64,
    /// Path prefix the API is mounted under (default: "/api")
    pub api_prefix: String,
    /// Public base URL used when rendering links (default: empty, links are relative)
    pub base_url: String,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }

    /// Build a configuration from environment variables
    ///
    /// `DATABASE_URL` is required. `RETAIL_NAMESPACE`, `RETAIL_MAX_CONNECTIONS`,
    /// `RETAIL_PAGE_LIMIT`, `RETAIL_MAX_PAGE_LIMIT` and `RETAIL_BASE_URL` are optional.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::validation("DATABASE_URL is not set"))?;

        StoreConfigBuilder::new(database_url)
            .env_overrides()?
            .try_build()
    }

    /// Absolute (or prefix-relative) URL for a path below the API prefix
    pub fn link(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StoreError::validation(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    namespace: String,
    max_connections: u32,
    default_page_limit: i64,
    max_page_limit: i64,
    api_prefix: String,
    base_url: String,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            namespace: "public".to_string(),
            max_connections: 10,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            api_prefix: "/api".to_string(),
            base_url: String::new(),
        }
    }

    /// Set the PostgreSQL schema name (default: "public")
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the pool size (default: 10)
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the default page size (default: 10)
    pub fn default_page_limit(mut self, limit: i64) -> Self {
        self.default_page_limit = limit;
        self
    }

    /// Set the maximum page size (default: 250)
    pub fn max_page_limit(mut self, limit: i64) -> Self {
        self.max_page_limit = limit;
        self
    }

    /// Set the path prefix the API is served under (default: "/api")
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Set the public base URL used in links, e.g. "http://localhost:8080"
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Apply the optional `RETAIL_*` environment variables
    pub fn env_overrides(mut self) -> Result<Self> {
        if let Ok(namespace) = std::env::var("RETAIL_NAMESPACE") {
            self = self.namespace(namespace);
        }
        if let Some(n) = env_number::<u32>("RETAIL_MAX_CONNECTIONS")? {
            self = self.max_connections(n);
        }
        if let Some(n) = env_number::<i64>("RETAIL_PAGE_LIMIT")? {
            self = self.default_page_limit(n);
        }
        if let Some(n) = env_number::<i64>("RETAIL_MAX_PAGE_LIMIT")? {
            self = self.max_page_limit(n);
        }
        if let Ok(base_url) = std::env::var("RETAIL_BASE_URL") {
            self = self.base_url(base_url);
        }
        Ok(self)
    }

    /// Build the configuration, normalising the prefix and clamping the limits
    pub fn build(self) -> StoreConfig {
        let max_page_limit = self.max_page_limit.max(1);
        let default_page_limit = self.default_page_limit.clamp(1, max_page_limit);

        let trimmed = self.api_prefix.trim_end_matches('/');
        let api_prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        StoreConfig {
            database_url: self.database_url,
            namespace: self.namespace,
            max_connections: self.max_connections.max(1),
            default_page_limit,
            max_page_limit,
            api_prefix,
            base_url: self.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the configuration and validate the namespace identifier
    pub fn try_build(self) -> Result<StoreConfig> {
        let config = self.build();
        validate_identifier(&config.namespace).map_err(|e| {
            StoreError::validation(format!("Invalid namespace '{}': {}", config.namespace, e))
        })?;
        Ok(config)
    }
}
