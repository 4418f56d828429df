//! Cache port for restforge API clients.
//!
//! API clients built with `restforge-client` use a cache only to persist
//! opaque values between calls, typically access tokens obtained by an
//! authentication routine. The client never inspects expiry; each store
//! enforces TTLs itself.
//!
//! # Features
//!
//! - `redis` - Enable the Redis store
//!
//! # Examples
//!
//! ```
//! use restforge_cache::*;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), CacheError> {
//! let cache = InMemoryCache::new();
//! cache
//!     .set("token", serde_json::json!("abc"), "json", Duration::from_secs(7200))
//!     .await?;
//!
//! let entry = cache.get("token").await?.unwrap();
//! assert_eq!(entry.format, "json");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
pub use traits::{CacheEntry, CacheStore};

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::CacheConfig;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::memory::InMemoryCache;
    pub use crate::traits::{CacheEntry, CacheStore};

    #[cfg(feature = "redis")]
    pub use crate::redis_cache::RedisCache;
}
