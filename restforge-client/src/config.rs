//! Builder configuration.

use http::{Method, StatusCode};
use restforge_cache::CacheStore;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::context::{FetchContext, Params};
use crate::interceptor::{
    AuthHook, FnInterceptor, FnTransformer, RequestDraft, RequestInterceptor, ResponseTransformer,
};
use crate::request::BodyEncoding;
use crate::response::{RawResponse, ResponseData, ResponseFormat, StatusPredicate, StatusRules};
use crate::retry::RetryPolicy;
use crate::transport::{ReqwestTransport, Transport, TransportConfig};
use crate::{Result, SdkError};

/// Per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Additional attempts after the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Method of endpoints registered without one.
pub const DEFAULT_METHOD: Method = Method::POST;

/// Immutable configuration of one client.
///
/// Everything here is fixed for the client's lifetime except `config`, which
/// only seeds the mutable config bag.
#[derive(Clone)]
pub struct SdkConfig {
    /// Base URL prepended to every endpoint path.
    pub base_url: String,
    /// Headers sent with every call; values may contain placeholders.
    pub default_headers: Vec<(String, String)>,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Declared body encoding.
    pub body_encoding: BodyEncoding,
    /// Fallback decode format.
    pub response_format: ResponseFormat,
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Method of endpoints registered without one.
    pub default_method: Method,
    /// Placeholder name to source parameter (or template), in order.
    pub placeholders: Vec<(String, String)>,
    /// Status classification predicates.
    pub status_rules: StatusRules,
    /// Initial config bag.
    pub config: Params,
    /// Route table registered when the client is created.
    pub endpoints: Vec<(String, String)>,
    /// HTTP transport.
    pub transport: Arc<dyn Transport>,
    /// Cache store exposed to function endpoints.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// Transform hook for successful responses.
    pub transformer: Option<Arc<dyn ResponseTransformer>>,
    /// Re-authentication hook.
    pub auth_hook: Option<Arc<dyn AuthHook>>,
    /// Request interceptors, in order.
    pub interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl SdkConfig {
    /// Create a new configuration builder.
    pub fn builder(base_url: impl Into<String>) -> SdkConfigBuilder {
        SdkConfigBuilder::new(base_url)
    }

    /// Builder-level retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

impl fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfig")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("body_encoding", &self.body_encoding)
            .field("response_format", &self.response_format)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("default_method", &self.default_method)
            .field("placeholders", &self.placeholders)
            .field("status_rules", &self.status_rules)
            .field("config", &self.config)
            .field("endpoints", &self.endpoints)
            .field("cache", &self.cache.is_some())
            .field("transformer", &self.transformer.is_some())
            .field("auth_hook", &self.auth_hook.is_some())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SdkConfig`].
pub struct SdkConfigBuilder {
    base_url: String,
    default_headers: Vec<(String, String)>,
    timeout: Duration,
    body_encoding: BodyEncoding,
    response_format: ResponseFormat,
    max_retries: u32,
    retry_delay: Duration,
    default_method: Method,
    placeholders: Vec<(String, String)>,
    status_rules: StatusRules,
    config: Params,
    endpoints: Vec<(String, String)>,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    cache: Option<Arc<dyn CacheStore>>,
    transformer: Option<Arc<dyn ResponseTransformer>>,
    auth_hook: Option<Arc<dyn AuthHook>>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl SdkConfigBuilder {
    /// Start a builder with every option at its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            body_encoding: BodyEncoding::Json,
            response_format: ResponseFormat::Json,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            default_method: DEFAULT_METHOD,
            placeholders: Vec::new(),
            status_rules: StatusRules::default(),
            config: Params::new(),
            endpoints: Vec::new(),
            transport: None,
            transport_config: TransportConfig::default(),
            cache: None,
            transformer: None,
            auth_hook: None,
            interceptors: Vec::new(),
        }
    }

    /// Set the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Add a default header; a later header with the same name replaces it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.default_headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.default_headers.push((name, value.into()));
        self
    }

    /// Set the per-attempt deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the declared body encoding.
    pub fn body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = encoding;
        self
    }

    /// Set the fallback decode format.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Set the number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the method of endpoints registered without one.
    pub fn default_method(mut self, method: Method) -> Self {
        self.default_method = method;
        self
    }

    /// Map a placeholder to a source parameter name or a `{...}` template.
    pub fn placeholder(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        let source = source.into();
        match self.placeholders.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = source,
            None => self.placeholders.push((name, source)),
        }
        self
    }

    /// Set the success predicate.
    pub fn validate_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode, &FetchContext) -> bool + Send + Sync + 'static,
    {
        self.status_rules.validate = StatusPredicate::new(predicate);
        self
    }

    /// Set the retryable predicate.
    pub fn retry_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode, &FetchContext) -> bool + Send + Sync + 'static,
    {
        self.status_rules.retry = StatusPredicate::new(predicate);
        self
    }

    /// Set the auth-required predicate.
    pub fn auth_check_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode, &FetchContext) -> bool + Send + Sync + 'static,
    {
        self.status_rules.auth_check = StatusPredicate::new(predicate);
        self
    }

    /// Set the terminal client error predicate.
    pub fn terminal_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(StatusCode, &FetchContext) -> bool + Send + Sync + 'static,
    {
        self.status_rules.terminal = StatusPredicate::new(predicate);
        self
    }

    /// Replace all status predicates.
    pub fn status_rules(mut self, rules: StatusRules) -> Self {
        self.status_rules = rules;
        self
    }

    /// Seed one config bag entry.
    pub fn config_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Seed config bag entries.
    pub fn config(mut self, values: Params) -> Self {
        self.config.extend(values);
        self
    }

    /// Register an endpoint from a route such as `"GET /users/{id}"` when the
    /// client is created.
    pub fn endpoint(mut self, name: impl Into<String>, route: impl Into<String>) -> Self {
        self.endpoints.push((name.into(), route.into()));
        self
    }

    /// Use a custom transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the connection settings of the default transport.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Set the connect timeout of the default transport.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport_config.connect_timeout = timeout;
        self
    }

    /// Set the user agent of the default transport.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transport_config.user_agent = user_agent.into();
        self
    }

    /// Attach a cache store.
    pub fn cache(mut self, cache: impl CacheStore + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Attach a shared cache store.
    pub fn shared_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Transform successful responses with a closure.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(ResponseData, &FetchContext, &RawResponse) -> ResponseData + Send + Sync + 'static,
    {
        self.transformer = Some(Arc::new(FnTransformer(transform)));
        self
    }

    /// Transform successful responses with a [`ResponseTransformer`].
    pub fn transformer(mut self, transformer: impl ResponseTransformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Set the re-authentication hook.
    pub fn auth_hook(mut self, hook: impl AuthHook + 'static) -> Self {
        self.auth_hook = Some(Arc::new(hook));
        self
    }

    /// Add a request interceptor.
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Add a synchronous request interceptor.
    pub fn map_request<F>(mut self, map: F) -> Self
    where
        F: Fn(RequestDraft) -> Result<RequestDraft> + Send + Sync + 'static,
    {
        self.interceptors.push(Arc::new(FnInterceptor(map)));
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SdkConfig> {
        if self.base_url.trim().is_empty() {
            return Err(SdkError::Config("base_url is required".to_string()));
        }
        Url::parse(&self.base_url)
            .map_err(|e| SdkError::InvalidUrl(format!("{}: {e}", self.base_url)))?;

        let mut default_headers = self.default_headers;
        let has_content_type = default_headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if self.body_encoding == BodyEncoding::Json && !has_content_type {
            default_headers.insert(0, ("Content-Type".to_string(), "application/json".to_string()));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.transport_config)?),
        };

        Ok(SdkConfig {
            base_url: self.base_url,
            default_headers,
            timeout: self.timeout,
            body_encoding: self.body_encoding,
            response_format: self.response_format,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            default_method: self.default_method,
            placeholders: self.placeholders,
            status_rules: self.status_rules,
            config: self.config,
            endpoints: self.endpoints,
            transport,
            cache: self.cache,
            transformer: self.transformer,
            auth_hook: self.auth_hook,
            interceptors: self.interceptors,
        })
    }
}

impl fmt::Debug for SdkConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfigBuilder")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("body_encoding", &self.body_encoding)
            .field("max_retries", &self.max_retries)
            .field("placeholders", &self.placeholders)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}
