//! Cache store trait definition.

use crate::error::CacheResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A stored value together with the format tag it was written with.
///
/// Expiry is owned by the store; callers never see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// Format tag supplied on write (for example `"json"`).
    pub format: String,
}

impl CacheEntry {
    /// Create a new entry.
    pub fn new(value: Value, format: impl Into<String>) -> Self {
        Self {
            value,
            format: format.into(),
        }
    }
}

/// Cache store used by API clients to persist opaque values such as tokens.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an entry from the cache.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(entry))` if the key exists and has not expired,
    /// `Ok(None)` otherwise.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store a value with a format tag and time-to-live.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The value to store
    /// * `format` - Format tag returned with the entry on read
    /// * `ttl` - Time-to-live; a zero TTL uses the store's default
    async fn set(&self, key: &str, value: Value, format: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Get only the value of an entry.
    async fn get_value(&self, key: &str) -> CacheResult<Option<Value>> {
        Ok(self.get(key).await?.map(|entry| entry.value))
    }
}
