// Restforge - declarative REST API SDKs for Rust
//
// Register endpoints by name, call them by name, and let the client handle
// placeholders, encoding, retries, timeouts and re-authentication.

// Re-export the client
pub use restforge_client::*;

// Re-export the cache port and stores
pub use restforge_cache as cache;
pub use restforge_cache::{CacheEntry, CacheStore, InMemoryCache};

#[cfg(feature = "redis")]
pub use restforge_cache::RedisCache;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BodyEncoding, CacheStore, CallOptions, EndpointOptions, FetchContext, FunctionCall,
        InMemoryCache, MultipartForm, Params, Payload, RawResponse, ResponseData, ResponseFormat,
        Result, SdkClient, SdkConfig, SdkError, SdkSettings, params, sdk_endpoints,
    };
}
