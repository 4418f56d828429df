//! Process-local cache store.

use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::traits::{CacheEntry, CacheStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory cache store.
///
/// Expired entries are evicted when read, overwritten on the next write to
/// the same key, or dropped by [`InMemoryCache::purge_expired`]. Keys that are
/// never read or rewritten again stay until a purge.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    data: Arc<RwLock<HashMap<String, StoredEntry>>>,
    config: CacheConfig,
}

#[derive(Clone)]
struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

impl InMemoryCache {
    /// Create new in-memory cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a custom configuration (key prefix, default TTL).
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) {
        let mut data = self.data.write().await;
        let now = Instant::now();
        data.retain(|_, stored| stored.expires_at > now);
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let key = self.config.build_key(key);
        {
            let data = self.data.read().await;
            match data.get(&key) {
                Some(stored) if Instant::now() < stored.expires_at => {
                    return Ok(Some(stored.entry.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Re-check under the write lock; a writer may have refreshed the key.
        let mut data = self.data.write().await;
        if data
            .get(&key)
            .is_some_and(|stored| Instant::now() >= stored.expires_at)
        {
            tracing::trace!(key = %key, "evicting expired cache entry");
            data.remove(&key);
        }
        Ok(data.get(&key).map(|stored| stored.entry.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        format: &str,
        ttl: Duration,
    ) -> CacheResult<()> {
        let key = self.config.build_key(key);
        let expires_at = Instant::now() + self.config.effective_ttl(ttl);
        let stored = StoredEntry {
            entry: CacheEntry::new(value, format),
            expires_at,
        };
        self.data.write().await.insert(key, stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = self.config.build_key(key);
        self.data.write().await.remove(&key);
        Ok(())
    }
}
