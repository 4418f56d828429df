//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// Default TTL applied when a caller passes a zero TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache configuration shared by the store implementations.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Connection URL (unused by the in-memory store)
    pub url: String,

    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// TTL used when an entry is stored with a zero TTL
    pub default_ttl: Duration,

    /// Connection timeout
    pub connection_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key_prefix: None,
            default_ttl: DEFAULT_TTL,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Create a new Redis cache configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Examples
    ///
    /// ```
    /// use restforge_cache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// assert_eq!(config.build_key("token"), "token");
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(CacheError::Config(format!(
                "expected a redis:// or rediss:// URL, got {url}"
            )));
        }

        Ok(Self {
            url,
            ..Default::default()
        })
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Resolve the TTL for an entry, substituting the default for zero.
    pub fn effective_ttl(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.default_ttl } else { ttl }
    }
}
