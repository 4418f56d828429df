//! Redis cache implementation.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::{CacheEntry, CacheStore};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;

/// Redis cache store.
///
/// Entries are stored as a JSON document `{"value": ..., "format": ...}`
/// under `SET EX`, so expiry is enforced by Redis.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl RedisCache {
    /// Create a new Redis cache instance.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use restforge_cache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::redis("redis://localhost:6379")?;
    ///     let cache = RedisCache::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Connection("timed out connecting to redis".to_string()))?
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self { connection, config })
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let key = self.config.build_key(key);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&key).await?;
        raw.map(|raw| {
            serde_json::from_str::<CacheEntry>(&raw)
                .map_err(|e| CacheError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        format: &str,
        ttl: Duration,
    ) -> CacheResult<()> {
        let key = self.config.build_key(key);
        let mut conn = self.connection.clone();

        let payload = serde_json::to_string(&CacheEntry::new(value, format))
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let ttl_seconds = self.config.effective_ttl(ttl).as_secs().max(1);

        let _: () = conn.set_ex(&key, payload, ttl_seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.config.build_key(key);
        let mut conn = self.connection.clone();
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}
