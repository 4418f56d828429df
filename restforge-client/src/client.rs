//! SDK client: registry, dispatch and the retry/auth call controller.

use http::Method;
use restforge_cache::CacheStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Span, debug, instrument, trace, warn};

use crate::config::SdkConfig;
use crate::context::{ConfigBag, Params, SharedConfig, try_params};
use crate::interceptor::RequestDraft;
use crate::registry::{
    EndpointDef, EndpointFn, EndpointOptions, FunctionCall, Registered, Registry, parse_route,
};
use crate::request::{Assembled, CallOptions, Payload, assemble};
use crate::response::{Classification, ResponseData, decode, select_format};
use crate::retry::{AttemptOutcome, CallState, RetryPolicy};
use crate::settings::SdkSettings;
use crate::{Result, SdkError};

/// Name of the function endpoint used as auth hook when none is configured.
pub const AUTHENTICATE: &str = "authenticate";

/// Endpoint name carried by ad-hoc calls.
pub const CUSTOM_ENDPOINT: &str = "custom";

tokio::task_local! {
    // Set while an auth hook runs, so nested auth failures fail fast instead
    // of waiting on the refresh lock held by the outer call.
    static AUTH_REFRESH: ();
}

/// Declarative REST client.
///
/// Cheap to clone; clones share the registry and the config bag.
///
/// ```rust,no_run
/// use restforge_client::{SdkClient, SdkConfig};
/// use serde_json::json;
///
/// # async fn demo() -> restforge_client::Result<()> {
/// let client = SdkClient::new(
///     SdkConfig::builder("https://api.example.com")
///         .placeholder("id", "userId")
///         .build()?,
/// )?;
/// client.register("getUser", "/users/{id}", Some(http::Method::GET));
///
/// let user = client.invoke("getUser", json!({"userId": "42"}), None).await?;
/// println!("{:?}", user.as_json());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SdkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: SdkConfig,
    shared: SharedConfig,
    registry: Registry,
    auth_lock: tokio::sync::Mutex<()>,
    auth_generation: AtomicU64,
}

enum Flow {
    Done(ResponseData),
    AuthRequired,
}

impl SdkClient {
    /// Create a client; the configured route table is registered right away.
    pub fn new(config: SdkConfig) -> Result<Self> {
        let routes = config.endpoints.clone();
        let client = Self {
            inner: Arc::new(ClientInner {
                shared: SharedConfig::new(config.config.clone()),
                config,
                registry: Registry::default(),
                auth_lock: tokio::sync::Mutex::new(()),
                auth_generation: AtomicU64::new(0),
            }),
        };
        client.register_table(routes)?;
        Ok(client)
    }

    /// Create a client from file or environment settings.
    pub fn from_settings(settings: SdkSettings) -> Result<Self> {
        Self::new(settings.into_builder()?.build()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Configured cache store, if any.
    pub fn cache(&self) -> Option<&Arc<dyn CacheStore>> {
        self.inner.config.cache.as_ref()
    }

    /// Current config bag snapshot.
    pub fn current_config(&self) -> Arc<ConfigBag> {
        self.inner.shared.snapshot()
    }

    /// Merge `delta` into the config bag. Calls already in flight keep the
    /// snapshot they started with.
    pub fn enhance_config(&self, delta: Params) -> Arc<ConfigBag> {
        let next = self.inner.shared.update(delta);
        debug!(version = next.version(), "Config bag updated");
        next
    }

    /// Register an HTTP endpoint; `method` defaults to the builder's default
    /// method. Re-registering a name replaces it.
    pub fn register(&self, name: impl Into<String>, path: impl Into<String>, method: Option<Method>) {
        self.register_with(name, path, method, EndpointOptions::default());
    }

    /// Register an HTTP endpoint with per-endpoint defaults.
    pub fn register_with(
        &self,
        name: impl Into<String>,
        path: impl Into<String>,
        method: Option<Method>,
        options: EndpointOptions,
    ) {
        let name = name.into();
        let def = EndpointDef {
            name: name.clone(),
            method: method.unwrap_or_else(|| self.inner.config.default_method.clone()),
            path: path.into(),
            options,
        };
        debug!(endpoint = %name, method = %def.method, path = %def.path, "Registering endpoint");
        if self
            .inner
            .registry
            .insert(name.clone(), Registered::Endpoint(Arc::new(def)))
        {
            debug!(endpoint = %name, "Replaced existing registration");
        }
    }

    /// Register an endpoint from a route such as `"GET /users/{id}"`.
    pub fn register_route(&self, name: impl Into<String>, route: &str) -> Result<()> {
        let (method, path) = parse_route(route)?;
        self.register(name, path, method);
        Ok(())
    }

    /// Register a route table of `(name, "METHOD /path")` pairs.
    pub fn register_table<I, N, R>(&self, table: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, R)>,
        N: Into<String>,
        R: AsRef<str>,
    {
        for (name, route) in table {
            self.register_route(name, route.as_ref())?;
        }
        Ok(())
    }

    /// Register a function in place of an HTTP endpoint.
    ///
    /// A function registered as [`AUTHENTICATE`] serves as the auth hook
    /// when the builder has none.
    pub fn register_fn<F>(&self, name: impl Into<String>, function: F)
    where
        F: EndpointFn + 'static,
    {
        let name = name.into();
        debug!(endpoint = %name, "Registering function endpoint");
        self.inner
            .registry
            .insert(name, Registered::Function(Arc::new(function)));
    }

    /// Definition of a registered HTTP endpoint.
    pub fn endpoint(&self, name: &str) -> Option<EndpointDef> {
        match self.inner.registry.get(name) {
            Some(Registered::Endpoint(def)) => Some(def.as_ref().clone()),
            _ => None,
        }
    }

    /// Check whether `name` is invocable.
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Registered names, sorted.
    pub fn endpoint_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Invoke a registered endpoint.
    ///
    /// For HTTP endpoints the body is sent (or, for GET, turned into query
    /// parameters) and `extra_params` always go to the query string. For
    /// function endpoints the body and extra params are passed as arguments.
    ///
    /// A JSON body that is not an object converts to an empty body; pass
    /// [`Payload::from_json`] to have it rejected instead.
    pub async fn invoke(
        &self,
        name: &str,
        body: impl Into<Payload>,
        extra_params: Option<Params>,
    ) -> Result<ResponseData> {
        let options = CallOptions::new()
            .body(body)
            .extra_params(extra_params.unwrap_or_default());
        self.invoke_with(name, options).await
    }

    /// Invoke a registered endpoint with full per-call options.
    pub async fn invoke_with(&self, name: &str, options: CallOptions) -> Result<ResponseData> {
        match self.inner.registry.get(name) {
            Some(Registered::Endpoint(def)) => {
                let mut options = options;
                def.options.apply(&mut options);
                self.execute(def.name.clone(), def.method.clone(), def.path.clone(), options)
                    .await
            }
            Some(Registered::Function(function)) => {
                let mut args = vec![match &options.body {
                    Payload::Fields(fields) => Value::Object(fields.clone()),
                    Payload::Multipart(_) => Value::Null,
                }];
                if !options.extra_params.is_empty() {
                    args.push(Value::Object(options.extra_params));
                }
                self.run_function(name, function, args)
                    .await
                    .map(ResponseData::Json)
            }
            None => Err(SdkError::UnregisteredEndpoint(name.to_string())),
        }
    }

    /// Invoke an endpoint and deserialize its JSON result.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        name: &str,
        body: impl Into<Payload>,
        extra_params: Option<Params>,
    ) -> Result<T> {
        self.invoke(name, body, extra_params).await?.deserialize()
    }

    /// Call a function endpoint with positional arguments.
    ///
    /// Calling an HTTP endpoint this way uses the first argument as body and
    /// the second as extra params. Both must be JSON objects or `null`;
    /// anything else fails with [`SdkError::Encode`].
    pub async fn call_fn(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        match self.inner.registry.get(name) {
            Some(Registered::Function(function)) => self.run_function(name, function, args).await,
            Some(Registered::Endpoint(_)) => {
                let mut args = args.into_iter();
                let body = Payload::from_json(args.next().unwrap_or(Value::Null))?;
                let extra = match args.next() {
                    Some(value) => Some(try_params(value.clone()).ok_or_else(|| {
                        SdkError::Encode(format!("extra params must be a JSON object, got {value}"))
                    })?),
                    None => None,
                };
                self.invoke(name, body, extra).await?.into_json()
            }
            None => Err(SdkError::UnregisteredEndpoint(name.to_string())),
        }
    }

    /// Ad-hoc call to `path` (relative to the base URL, or absolute).
    pub async fn request(&self, path: &str, options: CallOptions) -> Result<ResponseData> {
        let method = options
            .method
            .clone()
            .unwrap_or_else(|| self.inner.config.default_method.clone());
        self.execute(CUSTOM_ENDPOINT.to_string(), method, path.to_string(), options)
            .await
    }

    /// Ad-hoc GET; `params` go to the query string.
    pub async fn get(&self, path: &str, params: Params) -> Result<ResponseData> {
        self.request(path, CallOptions::new().method(Method::GET).extra_params(params))
            .await
    }

    /// Ad-hoc POST.
    pub async fn post(&self, path: &str, body: impl Into<Payload>) -> Result<ResponseData> {
        self.request(path, CallOptions::new().method(Method::POST).body(body))
            .await
    }

    async fn run_function(
        &self,
        name: &str,
        function: Arc<dyn EndpointFn>,
        args: Vec<Value>,
    ) -> Result<Value> {
        trace!(endpoint = %name, args = args.len(), "Calling function endpoint");
        function
            .call(FunctionCall {
                client: self.clone(),
                config: self.current_config(),
                args,
            })
            .await
            .map_err(|error| match error {
                SdkError::Auth(_) | SdkError::Function { .. } => error,
                other => SdkError::Function {
                    name: name.to_string(),
                    message: other.to_string(),
                },
            })
    }

    #[instrument(
        name = "sdk_call",
        skip_all,
        fields(
            endpoint = %endpoint_name,
            http.method = %method,
            http.url = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        )
    )]
    async fn execute(
        &self,
        endpoint_name: String,
        method: Method,
        path: String,
        mut options: CallOptions,
    ) -> Result<ResponseData> {
        let config = &self.inner.config;

        let mut draft = RequestDraft {
            endpoint_name,
            method,
            path,
            body: std::mem::take(&mut options.body),
            headers: std::mem::take(&mut options.headers),
            extra_params: std::mem::take(&mut options.extra_params),
        };
        for interceptor in &config.interceptors {
            draft = interceptor.intercept(draft).await.map_err(|error| match error {
                SdkError::Interceptor(_) => error,
                other => SdkError::Interceptor(other.to_string()),
            })?;
        }

        let policy = RetryPolicy::new(
            options.max_retries.unwrap_or(config.max_retries),
            options.retry_delay.unwrap_or(config.retry_delay),
        );

        let mut reauthenticated = false;
        loop {
            let generation = self.inner.auth_generation.load(Ordering::Acquire);
            let assembled = assemble(config, self.current_config(), draft.clone(), &options)?;
            Span::current().record("http.url", assembled.context.url.as_str());

            match self.attempt_loop(&assembled, &options, policy).await? {
                Flow::Done(data) => return Ok(data),
                Flow::AuthRequired if reauthenticated => {
                    warn!("Authentication still required after refreshing credentials");
                    return Err(SdkError::Auth(
                        "authentication required after credentials were refreshed".to_string(),
                    ));
                }
                Flow::AuthRequired => {
                    self.refresh_auth(generation).await?;
                    reauthenticated = true;
                }
            }
        }
    }

    async fn attempt_loop(
        &self,
        assembled: &Assembled,
        options: &CallOptions,
        policy: RetryPolicy,
    ) -> Result<Flow> {
        let config = &self.inner.config;
        let context = &assembled.context;
        let mut attempt = 0;

        loop {
            attempt += 1;
            trace!(attempt, url = %context.url, "Sending attempt");

            let sent = tokio::time::timeout(
                config.timeout,
                config.transport.send(assembled.request.clone()),
            )
            .await;

            match sent {
                Err(_) => {
                    if policy.next_state(attempt, AttemptOutcome::TimedOut) == CallState::Failed {
                        warn!(attempts = attempt, "Request timed out, giving up");
                        return Err(SdkError::Timeout {
                            timeout: config.timeout,
                            attempts: attempt,
                        });
                    }
                    debug!(attempt, timeout = ?config.timeout, "Retrying request after timeout");
                }
                Ok(Err(error)) => {
                    if policy.next_state(attempt, AttemptOutcome::TransportFailed)
                        == CallState::Failed
                    {
                        warn!(attempts = attempt, error = %error, "Request failed, giving up");
                        return Err(SdkError::RetryExhausted {
                            attempts: attempt,
                            status: None,
                            message: error.to_string(),
                        });
                    }
                    debug!(attempt, error = %error, "Retrying request due to error");
                }
                Ok(Ok(raw)) => {
                    let status = raw.status();
                    Span::current().record("http.status_code", status.as_u16());
                    let class = config.status_rules.classify(status, context);

                    match policy.next_state(attempt, AttemptOutcome::Status(class)) {
                        CallState::Success => {
                            let format =
                                select_format(options.response_format, &raw, config.response_format);
                            let data = decode(&raw, format)?;
                            let data = match &config.transformer {
                                Some(transformer) => transformer.transform(data, context, &raw),
                                None => data,
                            };
                            return Ok(Flow::Done(data));
                        }
                        CallState::AuthRefresh => return Ok(Flow::AuthRequired),
                        CallState::Failed if class == Classification::Terminal => {
                            return Err(SdkError::TerminalClient {
                                status: status.as_u16(),
                                body: raw.text_lossy(),
                            });
                        }
                        CallState::Failed => {
                            warn!(attempts = attempt, status = %status, "Retries exhausted");
                            let body = raw.text_lossy();
                            return Err(SdkError::RetryExhausted {
                                attempts: attempt,
                                status: Some(status.as_u16()),
                                message: if body.is_empty() {
                                    format!("HTTP {status}")
                                } else {
                                    body
                                },
                            });
                        }
                        CallState::RetryWait | CallState::Attempt => {
                            debug!(attempt, status = %status, "Retrying request due to status code");
                        }
                    }
                }
            }

            policy.wait().await;
        }
    }

    /// Run the auth hook once for all calls that saw the same credentials.
    async fn refresh_auth(&self, seen_generation: u64) -> Result<()> {
        if AUTH_REFRESH.try_with(|_| ()).is_ok() {
            return Err(SdkError::Auth(
                "authentication required while refreshing credentials".to_string(),
            ));
        }

        let _guard = self.inner.auth_lock.lock().await;
        if self.inner.auth_generation.load(Ordering::Acquire) != seen_generation {
            debug!("Credentials already refreshed by a concurrent call");
            return Ok(());
        }

        warn!("Authentication required, refreshing credentials");
        let delta = AUTH_REFRESH.scope((), self.authenticate()).await?;
        self.enhance_config(delta);
        self.inner.auth_generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn authenticate(&self) -> Result<Params> {
        if let Some(hook) = &self.inner.config.auth_hook {
            return hook.authenticate(self).await.map_err(auth_error);
        }

        match self.inner.registry.get(AUTHENTICATE) {
            Some(Registered::Function(function)) => {
                let value = self
                    .run_function(AUTHENTICATE, function, Vec::new())
                    .await
                    .map_err(auth_error)?;
                try_params(value).ok_or_else(|| {
                    SdkError::Auth(format!("{AUTHENTICATE} must return an object"))
                })
            }
            _ => Err(SdkError::Auth("no authentication hook configured".to_string())),
        }
    }
}

fn auth_error(error: SdkError) -> SdkError {
    match error {
        SdkError::Auth(_) => error,
        other => SdkError::Auth(other.to_string()),
    }
}

impl fmt::Debug for SdkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkClient")
            .field("base_url", &self.inner.config.base_url)
            .field("endpoints", &self.inner.registry.names())
            .field("config_version", &self.current_config().version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::params;
    use crate::interceptor::AuthHook;
    use crate::request::{OutgoingBody, OutgoingRequest};
    use crate::response::RawResponse;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    enum Scripted {
        Reply(u16, &'static str),
        Hang,
        Fail,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<OutgoingRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.sent.lock().len()
        }

        fn urls(&self) -> Vec<String> {
            self.sent.lock().iter().map(|r| r.url.to_string()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: OutgoingRequest) -> Result<RawResponse> {
            self.sent.lock().push(request);
            let next = self.script.lock().pop_front();
            match next {
                Some(Scripted::Reply(status, body)) => {
                    let mut headers = HeaderMap::new();
                    headers.insert("content-type", HeaderValue::from_static("application/json"));
                    Ok(RawResponse::new(
                        StatusCode::from_u16(status).unwrap(),
                        headers,
                        body,
                    ))
                }
                Some(Scripted::Hang) => std::future::pending().await,
                Some(Scripted::Fail) | None => Err(SdkError::Transport("connection refused".into())),
            }
        }
    }

    fn client(transport: &Arc<ScriptedTransport>, max_retries: u32) -> SdkClient {
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .max_retries(max_retries)
            .retry_delay(Duration::from_millis(100))
            .timeout(Duration::from_millis(1000))
            .placeholder("access_token", "{access_token}")
            .endpoint("getUser", "GET /users/{id}")
            .build()
            .unwrap();
        SdkClient::new(config).unwrap()
    }

    fn counting_hook(count: Arc<AtomicUsize>) -> impl AuthHook {
        move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, SdkError>(params(json!({"access_token": "fresh"})))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_makes_max_retries_plus_one_attempts() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Reply(503, "down"),
            Scripted::Reply(503, "down"),
            Scripted::Reply(503, "still down"),
        ]);
        let client = client(&transport, 2);
        let start = tokio::time::Instant::now();

        let err = client.invoke("getUser", json!({"id": 1}), None).await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
        match err {
            SdkError::RetryExhausted {
                attempts,
                status,
                message,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(status, Some(503));
                assert_eq!(message, "still down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail,
            Scripted::Reply(500, ""),
            Scripted::Reply(200, r#"{"id": 1}"#),
        ]);
        let client = client(&transport, 3);

        let data = client.invoke("getUser", json!({"id": 1}), None).await.unwrap();

        assert_eq!(data.as_json(), Some(&json!({"id": 1})));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_all_attempts() {
        let transport = ScriptedTransport::new(vec![Scripted::Hang, Scripted::Hang]);
        let client = client(&transport, 1);

        let err = client.invoke("getUser", json!({}), None).await.unwrap_err();

        assert_eq!(transport.calls(), 2);
        assert!(matches!(err, SdkError::Timeout { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_gets_a_fresh_deadline() {
        let transport =
            ScriptedTransport::new(vec![Scripted::Hang, Scripted::Reply(200, r#"{"ok": true}"#)]);
        let client = client(&transport, 1);

        let data = client.invoke("getUser", json!({}), None).await.unwrap();
        assert_eq!(data.as_json(), Some(&json!({"ok": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(400, r#"{"errcode":40013}"#)]);
        let client = client(&transport, 3);

        let err = client.invoke("getUser", json!({}), None).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        match err {
            SdkError::TerminalClient { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"errcode":40013}"#);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(200, "not json")]);
        let client = client(&transport, 3);

        let err = client.invoke("getUser", json!({}), None).await.unwrap_err();

        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, SdkError::Decode(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_refresh_runs_hook_once_and_reissues() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Reply(401, ""),
            Scripted::Reply(200, r#"{"id": 7}"#),
        ]);
        let count = Arc::new(AtomicUsize::new(0));
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .max_retries(0)
            .placeholder("access_token", "{access_token}")
            .auth_hook(counting_hook(count.clone()))
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();
        client.register("getUser", "/users/{id}", Some(Method::GET));

        let data = client
            .invoke("getUser", json!({"id": 7}), None)
            .await
            .unwrap();

        assert_eq!(data.as_json(), Some(&json!({"id": 7})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(client.current_config().get_str("access_token"), Some("fresh"));
        assert_eq!(
            transport.urls(),
            vec![
                "https://api.example.com/users/7".to_string(),
                "https://api.example.com/users/7?access_token=fresh".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_auth_failure_is_an_auth_error() {
        let transport =
            ScriptedTransport::new(vec![Scripted::Reply(401, ""), Scripted::Reply(401, "")]);
        let count = Arc::new(AtomicUsize::new(0));
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .auth_hook(counting_hook(count.clone()))
            .endpoint("me", "GET /me")
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();

        let err = client.invoke("me", (), None).await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_required_without_hook() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(401, "")]);
        let client = client(&transport, 3);

        let err = client.invoke("getUser", json!({}), None).await.unwrap_err();

        assert!(matches!(err, SdkError::Auth(ref m) if m.contains("no authentication hook")));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_function_is_the_fallback_hook() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Reply(401, ""),
            Scripted::Reply(200, r#"{"access_token": "t-2"}"#),
            Scripted::Reply(200, r#"{"id": 1}"#),
        ]);
        let client = client(&transport, 0);
        client.register("fetchToken", "/token", Some(Method::GET));
        client.register_fn(AUTHENTICATE, |call: FunctionCall| async move {
            let token = call.client.call_fn("fetchToken", vec![json!({})]).await?;
            Ok::<_, SdkError>(token)
        });

        let data = client.invoke("getUser", json!({"id": 1}), None).await.unwrap();

        assert_eq!(data.as_json(), Some(&json!({"id": 1})));
        assert_eq!(client.current_config().get_str("access_token"), Some("t-2"));
        assert_eq!(client.current_config().version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_auth_failure_fails_fast() {
        let transport =
            ScriptedTransport::new(vec![Scripted::Reply(401, ""), Scripted::Reply(401, "")]);
        let client = client(&transport, 0);
        client.register("fetchToken", "/token", Some(Method::GET));
        client.register_fn(AUTHENTICATE, |call: FunctionCall| async move {
            call.client.call_fn("fetchToken", Vec::new()).await
        });

        let err = client.invoke("getUser", json!({}), None).await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_auth_refresh_is_single_flight() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Reply(401, ""),
            Scripted::Reply(401, ""),
            Scripted::Reply(200, "{}"),
            Scripted::Reply(200, "{}"),
        ]);
        let count = Arc::new(AtomicUsize::new(0));
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .auth_hook(counting_hook(count.clone()))
            .endpoint("me", "GET /me")
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();

        let (a, b) = tokio::join!(client.invoke("me", (), None), client.invoke("me", (), None));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn test_unregistered_endpoint() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = client(&transport, 0);

        let err = client.invoke("deleteUser", (), None).await.unwrap_err();

        assert!(matches!(err, SdkError::UnregisteredEndpoint(ref name) if name == "deleteUser"));
        assert_eq!(err.to_string(), "Endpoint deleteUser not registered");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_function_endpoint_bypasses_network() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = client(&transport, 0);
        client.enhance_config(params(json!({"appId": "wx1"})));
        client.register_fn("describe", |call: FunctionCall| async move {
            Ok::<_, SdkError>(json!({
                "appId": call.config.get("appId"),
                "arg": call.arg(0),
            }))
        });

        let data = client.invoke("describe", json!({"x": 1}), None).await.unwrap();

        assert_eq!(
            data.as_json(),
            Some(&json!({"appId": "wx1", "arg": {"x": 1}}))
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_function_endpoint_errors_carry_the_name() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = client(&transport, 0);
        client.register_fn("broken", |_call: FunctionCall| async move {
            Err::<Value, _>(SdkError::Config("missing appId".to_string()))
        });

        let err = client.call_fn("broken", Vec::new()).await.unwrap_err();

        match err {
            SdkError::Function { name, message } => {
                assert_eq!(name, "broken");
                assert!(message.contains("missing appId"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_interceptor_failure_stops_the_call() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(200, "{}")]);
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .map_request(|_draft: RequestDraft| -> Result<RequestDraft> {
                Err(SdkError::Config("request rejected".to_string()))
            })
            .endpoint("me", "GET /me")
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();

        let err = client.invoke("me", (), None).await.unwrap_err();

        assert!(matches!(err, SdkError::Interceptor(ref m) if m.contains("request rejected")));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_call_fn_rejects_non_object_body() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(200, "{}")]);
        let client = client(&transport, 0);

        let err = client
            .call_fn("getUser", vec![json!(["not", "an", "object"])])
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Encode(_)));

        let err = client
            .call_fn("getUser", vec![json!({"id": 1}), json!("extra")])
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Encode(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_retry_override() {
        let transport = ScriptedTransport::new(vec![Scripted::Fail, Scripted::Fail]);
        let client = client(&transport, 3);

        let err = client
            .invoke_with("getUser", CallOptions::new().max_retries(1))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(2));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ad_hoc_calls_use_custom_endpoint_name() {
        let transport = ScriptedTransport::new(vec![Scripted::Reply(200, "{}")]);
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .transform(|data, ctx, _| {
                assert_eq!(ctx.endpoint_name, CUSTOM_ENDPOINT);
                data
            })
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();

        client
            .post("/events", json!({"kind": "login"}))
            .await
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].method, Method::POST);
        match &sent[0].body {
            Some(OutgoingBody::Bytes(bytes)) => assert_eq!(&bytes[..], br#"{"kind":"login"}"#),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_table_registration() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = client(&transport, 0);
        client
            .register_table([("createUser", "POST /users"), ("listUsers", "/users")])
            .unwrap();

        assert_eq!(client.endpoint("createUser").unwrap().method, Method::POST);
        assert_eq!(client.endpoint("listUsers").unwrap().method, Method::POST);
        assert_eq!(client.endpoint("getUser").unwrap().method, Method::GET);
        assert!(client.register_table([("bad", "FETCH /x")]).is_err());
        assert_eq!(
            client.endpoint_names(),
            vec!["createUser", "getUser", "listUsers"]
        );
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn test_retries_and_auth_refresh_are_logged() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Reply(503, ""),
            Scripted::Reply(401, ""),
            Scripted::Reply(200, "{}"),
        ]);
        let count = Arc::new(AtomicUsize::new(0));
        let config = SdkConfig::builder("https://api.example.com")
            .shared_transport(transport.clone())
            .auth_hook(counting_hook(count))
            .endpoint("me", "GET /me")
            .build()
            .unwrap();
        let client = SdkClient::new(config).unwrap();

        client.invoke("me", (), None).await.unwrap();

        assert!(logs_contain("sdk_call"));
        assert!(logs_contain("Retrying request due to status code"));
        assert!(logs_contain("Authentication required, refreshing credentials"));
        assert!(logs_contain("http.status_code=503"));
    }
}
