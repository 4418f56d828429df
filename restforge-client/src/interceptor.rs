//! Request interceptors, response transformers and authentication hooks.

use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use std::future::Future;

use crate::client::SdkClient;
use crate::context::{FetchContext, Params};
use crate::request::Payload;
use crate::response::{RawResponse, ResponseData};
use crate::Result;

/// A call before placeholder resolution, as seen by request interceptors.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    /// Registered endpoint name, or `custom`.
    pub endpoint_name: String,
    /// HTTP method.
    pub method: Method,
    /// Path template.
    pub path: String,
    /// Call body.
    pub body: Payload,
    /// Call headers (defaults are applied underneath these).
    pub headers: Vec<(String, String)>,
    /// Extra query parameters.
    pub extra_params: Params,
}

/// Rewrites a call before it is assembled.
///
/// Interceptors run once per logical call, in registration order, and not
/// again on retries.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Intercept and optionally modify the draft.
    async fn intercept(&self, draft: RequestDraft) -> Result<RequestDraft>;
}

pub(crate) struct FnInterceptor<F>(pub(crate) F);

#[async_trait]
impl<F> RequestInterceptor for FnInterceptor<F>
where
    F: Fn(RequestDraft) -> Result<RequestDraft> + Send + Sync,
{
    async fn intercept(&self, draft: RequestDraft) -> Result<RequestDraft> {
        (self.0)(draft)
    }
}

/// Logging interceptor that logs outgoing calls.
#[derive(Debug, Default, Clone)]
pub struct LoggingInterceptor {
    log_headers: bool,
    log_body: bool,
}

impl LoggingInterceptor {
    /// Create a new logging interceptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }

    /// Enable logging of body.
    pub fn with_body(mut self) -> Self {
        self.log_body = true;
        self
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn intercept(&self, draft: RequestDraft) -> Result<RequestDraft> {
        tracing::debug!(
            endpoint = %draft.endpoint_name,
            method = %draft.method,
            path = %draft.path,
            "Dispatching SDK call"
        );

        if self.log_headers {
            for (name, value) in &draft.headers {
                tracing::trace!(header = %name, value = %value, "Call header");
            }
        }
        if self.log_body {
            tracing::trace!(body = ?draft.body, "Call body");
        }

        Ok(draft)
    }
}

/// Rewrites decoded data of successful responses.
pub trait ResponseTransformer: Send + Sync {
    /// Produce the data returned to the caller.
    fn transform(&self, data: ResponseData, context: &FetchContext, raw: &RawResponse)
        -> ResponseData;
}

pub(crate) struct FnTransformer<F>(pub(crate) F);

impl<F> ResponseTransformer for FnTransformer<F>
where
    F: Fn(ResponseData, &FetchContext, &RawResponse) -> ResponseData + Send + Sync,
{
    fn transform(
        &self,
        data: ResponseData,
        context: &FetchContext,
        raw: &RawResponse,
    ) -> ResponseData {
        (self.0)(data, context, raw)
    }
}

/// Sets `"transformed": true` on JSON object responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkTransformed;

impl ResponseTransformer for MarkTransformed {
    fn transform(&self, data: ResponseData, _: &FetchContext, _: &RawResponse) -> ResponseData {
        match data {
            ResponseData::Json(Value::Object(mut map)) => {
                map.insert("transformed".to_string(), Value::Bool(true));
                ResponseData::Json(Value::Object(map))
            }
            other => other,
        }
    }
}

/// Obtains fresh credentials after an auth-required response.
///
/// The returned values are merged into the client's config bag before the
/// call is re-issued. Plain zero-argument async closures are hooks; types
/// implementing the trait directly also get the client, so they can call
/// other endpoints (a token endpoint, typically).
#[async_trait]
pub trait AuthHook: Send + Sync {
    /// Fetch credentials.
    async fn authenticate(&self, client: &SdkClient) -> Result<Params>;
}

#[async_trait]
impl<F, Fut> AuthHook for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Params>> + Send + 'static,
{
    async fn authenticate(&self, _client: &SdkClient) -> Result<Params> {
        (self)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConfigBag, params};
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> FetchContext {
        FetchContext {
            endpoint_name: "getUser".to_string(),
            method: Method::GET,
            path: "/users/{id}".to_string(),
            url: "https://api.example.com/users/1".to_string(),
            body: Payload::default(),
            headers: HeaderMap::new(),
            extra_params: Params::new(),
            config: Arc::new(ConfigBag::default()),
        }
    }

    fn draft() -> RequestDraft {
        RequestDraft {
            endpoint_name: "getUser".to_string(),
            method: Method::GET,
            path: "/users/{id}".to_string(),
            body: Payload::default(),
            headers: vec![("X-Trace".to_string(), "1".to_string())],
            extra_params: Params::new(),
        }
    }

    #[tokio::test]
    async fn test_logging_interceptor_passes_through() {
        let out = LoggingInterceptor::new()
            .with_headers()
            .with_body()
            .intercept(draft())
            .await
            .unwrap();
        assert_eq!(out.path, "/users/{id}");
        assert_eq!(out.headers.len(), 1);
    }

    #[tokio::test]
    async fn test_fn_interceptor_rewrites_draft() {
        let interceptor = FnInterceptor(|mut draft: RequestDraft| -> Result<RequestDraft> {
            draft.headers.push(("X-Api-Key".to_string(), "k".to_string()));
            Ok(draft)
        });
        let out = interceptor.intercept(draft()).await.unwrap();
        assert_eq!(out.headers[1].0, "X-Api-Key");
    }

    #[test]
    fn test_mark_transformed() {
        let raw = RawResponse::new(StatusCode::OK, HeaderMap::new(), "{}");
        let data = MarkTransformed.transform(ResponseData::Json(json!({"id": 1})), &context(), &raw);
        assert_eq!(data.as_json(), Some(&json!({"id": 1, "transformed": true})));

        let text = MarkTransformed.transform(ResponseData::Text("hi".into()), &context(), &raw);
        assert_eq!(text.as_text(), Some("hi"));
    }

    #[test]
    fn test_fn_transformer_sees_context() {
        let transformer = FnTransformer(|data: ResponseData, ctx: &FetchContext, _: &RawResponse| {
            match data {
                ResponseData::Json(value) => {
                    ResponseData::Json(json!({"endpoint": ctx.endpoint_name, "data": value}))
                }
                other => other,
            }
        });
        let raw = RawResponse::new(StatusCode::OK, HeaderMap::new(), "1");
        let data = transformer.transform(ResponseData::Json(json!(1)), &context(), &raw);
        assert_eq!(data.as_json(), Some(&json!({"endpoint": "getUser", "data": 1})));
    }

    #[test]
    fn test_auth_hook_closure_is_a_hook() {
        fn assert_hook<H: AuthHook>(_: &H) {}
        let hook = || async { Ok::<_, crate::SdkError>(params(json!({"access_token": "t"}))) };
        assert_hook(&hook);
    }
}
