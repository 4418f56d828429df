//! # Restforge Client
//!
//! Declarative REST API clients: register endpoints by name, invoke them by
//! name, and let the client handle placeholder substitution, body encoding,
//! per-attempt timeouts, retries and re-authentication.
//!
//! ## Features
//!
//! - **Endpoint registry**: `name -> METHOD /path/{token}`, plus function endpoints
//! - **Placeholders**: `{token}` in paths and headers, resolved from the call and the config bag
//! - **Retry**: fixed-delay retries on timeouts, transport errors and 5xx
//! - **Auth refresh**: a 401 runs the auth hook once and re-issues the call
//! - **Decoding**: JSON, text, blob or buffer, by override or content-type sniffing
//! - **Settings**: JSON/TOML files with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use restforge_client::{SdkClient, SdkConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SdkConfig::builder("https://api.example.com")
//!         .placeholder("id", "userId")
//!         .endpoint("getUser", "GET /users/{id}")
//!         .endpoint("createUser", "POST /users")
//!         .build()?;
//!     let client = SdkClient::new(config)?;
//!
//!     // GET https://api.example.com/users/42
//!     let user = client.invoke("getUser", json!({"userId": "42"}), None).await?;
//!     println!("{:?}", user.as_json());
//!
//!     // POST https://api.example.com/users with {"name":"Ann"}
//!     client.invoke("createUser", json!({"name": "Ann"}), None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-authentication
//!
//! ```rust,no_run
//! use restforge_client::{SdkClient, SdkConfig, SdkError, params};
//! use serde_json::json;
//!
//! # fn demo() -> restforge_client::Result<()> {
//! let config = SdkConfig::builder("https://api.example.com")
//!     .default_header("Authorization", "Bearer {access_token}")
//!     .auth_hook(|| async {
//!         // fetch a token somewhere
//!         Ok::<_, SdkError>(params(json!({"access_token": "fresh-token"})))
//!     })
//!     .build()?;
//! let client = SdkClient::new(config)?;
//! # Ok(())
//! # }
//! ```

mod macros;

mod client;
mod config;
mod context;
mod error;
mod interceptor;
mod placeholder;
mod registry;
mod request;
mod response;
mod retry;
mod settings;
mod transport;

pub use client::{AUTHENTICATE, CUSTOM_ENDPOINT, SdkClient};
pub use config::{
    DEFAULT_MAX_RETRIES, DEFAULT_METHOD, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT, SdkConfig,
    SdkConfigBuilder,
};
pub use context::{ConfigBag, FetchContext, Params, params, try_params};
pub use error::{Result, SdkError};
pub use interceptor::{
    AuthHook, LoggingInterceptor, MarkTransformed, RequestDraft, RequestInterceptor,
    ResponseTransformer,
};
pub use placeholder::{
    PlaceholderResolver, Resolution, encode_path_segment, substitute, value_to_string,
};
pub use registry::{
    EndpointDef, EndpointFn, EndpointOptions, FunctionCall, parse_method, parse_route,
};
pub use request::{
    BodyEncoding, BodySerializer, CallOptions, FORM_URLENCODED, MultipartForm, OutgoingBody,
    OutgoingRequest, Part, PartContent, Payload, form_urlencode, is_get_style,
};
pub use response::{
    Blob, Classification, RawResponse, ResponseData, ResponseFormat, StatusPredicate,
    StatusRules, decode, select_format,
};
pub use retry::{AttemptOutcome, CallState, RetryPolicy};
pub use settings::{DEFAULT_ENV_PREFIX, SdkSettings, SettingsFormat};
pub use transport::{ReqwestTransport, Transport, TransportConfig};

pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};
pub use restforge_cache;
pub use url::Url;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        BodyEncoding, CallOptions, EndpointOptions, FetchContext, FunctionCall, MultipartForm,
        Params, Payload, RawResponse, ResponseData, ResponseFormat, Result, SdkClient, SdkConfig,
        SdkError, SdkSettings, params,
    };
}
