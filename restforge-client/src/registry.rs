//! Endpoint registry: name to endpoint definition or function.

use futures::future::BoxFuture;
use http::Method;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::client::SdkClient;
use crate::context::ConfigBag;
use crate::request::{CallOptions, merge_headers};
use crate::response::ResponseFormat;
use crate::{Result, SdkError};

/// Per-endpoint defaults, applied underneath per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointOptions {
    /// Decode format override.
    pub response_format: Option<ResponseFormat>,
    /// Content type override.
    pub content_type: Option<String>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Delay between attempts.
    pub retry_delay: Option<Duration>,
    /// Additional attempts after the first.
    pub max_retries: Option<u32>,
}

impl EndpointOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the decode format.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Override the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Override the number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Fill the unset fields of `options`; call headers win over endpoint
    /// headers.
    pub(crate) fn apply(&self, options: &mut CallOptions) {
        if options.response_format.is_none() {
            options.response_format = self.response_format;
        }
        if options.content_type.is_none() {
            options.content_type = self.content_type.clone();
        }
        if options.retry_delay.is_none() {
            options.retry_delay = self.retry_delay;
        }
        if options.max_retries.is_none() {
            options.max_retries = self.max_retries;
        }
        if !self.headers.is_empty() {
            options.headers = merge_headers(&self.headers, &options.headers);
        }
    }
}

/// A registered HTTP endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDef {
    /// Dispatch name.
    pub name: String,
    /// HTTP method.
    pub method: Method,
    /// Path template, possibly with `{token}` placeholders.
    pub path: String,
    /// Endpoint defaults.
    pub options: EndpointOptions,
}

/// Parse one of the supported methods, case-insensitively.
pub fn parse_method(method: &str) -> Result<Method> {
    match method.trim().to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => Err(SdkError::Config(format!("unsupported HTTP method: {other}"))),
    }
}

/// Parse a route-table entry: `"GET /users/{id}"` or a bare `"/users"`.
pub fn parse_route(route: &str) -> Result<(Option<Method>, String)> {
    let route = route.trim();
    match route.split_once(char::is_whitespace) {
        Some((method, path)) => Ok((Some(parse_method(method)?), path.trim().to_string())),
        None if route.is_empty() => Err(SdkError::Config("empty route".to_string())),
        None => Ok((None, route.to_string())),
    }
}

/// Arguments of a function endpoint invocation.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    /// The client the function is registered on.
    pub client: SdkClient,
    /// Config bag snapshot at invocation time.
    pub config: Arc<ConfigBag>,
    /// Call arguments.
    pub args: Vec<Value>,
}

impl FunctionCall {
    /// Argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// A function registered in place of an HTTP endpoint.
///
/// Any `Fn(FunctionCall) -> impl Future<Output = Result<Value>>` qualifies.
pub trait EndpointFn: Send + Sync {
    /// Run the function.
    fn call(&self, call: FunctionCall) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut> EndpointFn for F
where
    F: Fn(FunctionCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, call: FunctionCall) -> BoxFuture<'static, Result<Value>> {
        Box::pin((self)(call))
    }
}

#[derive(Clone)]
pub(crate) enum Registered {
    Endpoint(Arc<EndpointDef>),
    Function(Arc<dyn EndpointFn>),
}

impl fmt::Debug for Registered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(def) => f.debug_tuple("Endpoint").field(def).finish(),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: RwLock<HashMap<String, Registered>>,
}

impl Registry {
    /// Store an entry; returns `true` when an earlier one was replaced.
    pub(crate) fn insert(&self, name: String, entry: Registered) -> bool {
        self.entries.write().insert(name, entry).is_some()
    }

    pub(crate) fn get(&self, name: &str) -> Option<Registered> {
        self.entries.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}
