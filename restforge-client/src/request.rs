//! Request assembly: payloads, body encoding and per-call options.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::SdkConfig;
use crate::context::{ConfigBag, FetchContext, Params};
use crate::interceptor::RequestDraft;
use crate::placeholder::{PlaceholderResolver, value_to_string};
use crate::response::ResponseFormat;
use crate::{Result, SdkError};

/// Content type used for url-encoded bodies when no MIME type is given.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Body encoding declared on the builder.
///
/// `Json` serializes bodies as JSON; every other encoding sends url-encoded
/// form data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// JSON bodies.
    #[default]
    Json,
    /// Form-encoded text bodies.
    Text,
    /// Form-encoded bodies (blob-typed APIs).
    Blob,
    /// Form-encoded bodies (buffer-typed APIs).
    Buffer,
}

impl BodyEncoding {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Buffer => "buffer",
        }
    }
}

impl FromStr for BodyEncoding {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "blob" => Ok(Self::Blob),
            "buffer" => Ok(Self::Buffer),
            other => Err(SdkError::Config(format!("unknown body encoding: {other}"))),
        }
    }
}

/// Call body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Key/value body; JSON or form encoded, or the query source for GET.
    Fields(Params),
    /// Multipart body; the transport sets the content type and boundary.
    Multipart(MultipartForm),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Fields(Params::new())
    }
}

impl Payload {
    /// The fields of a key/value body.
    pub fn fields(&self) -> Option<&Params> {
        match self {
            Self::Fields(fields) => Some(fields),
            Self::Multipart(_) => None,
        }
    }

    /// Whether this is a multipart body.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Fields from a JSON object; `null` is an empty body and any other
    /// value fails with [`SdkError::Encode`].
    pub fn from_json(value: Value) -> Result<Self> {
        crate::context::try_params(value.clone())
            .map(Self::Fields)
            .ok_or_else(|| SdkError::Encode(format!("body must be a JSON object, got {value}")))
    }
}

impl From<Params> for Payload {
    fn from(fields: Params) -> Self {
        Self::Fields(fields)
    }
}

/// Objects become fields; any other JSON value is an empty body. Use
/// [`Payload::from_json`] to reject non-object values instead.
impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Fields(crate::context::params(value))
    }
}

impl From<MultipartForm> for Payload {
    fn from(form: MultipartForm) -> Self {
        Self::Multipart(form)
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// Transport-independent multipart form, cloneable so it can be re-sent on
/// every attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

/// One multipart field.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Field name.
    pub name: String,
    /// Field content.
    pub content: PartContent,
}

/// Content of a multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    /// Plain text value.
    Text(String),
    /// File upload.
    File {
        /// File bytes.
        data: Bytes,
        /// File name sent in the disposition header.
        file_name: Option<String>,
        /// MIME type of the file.
        mime: Option<String>,
    },
}

impl MultipartForm {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            content: PartContent::Text(value.into()),
        });
        self
    }

    /// Add a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        file_name: Option<String>,
        mime: Option<String>,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            content: PartContent::File {
                data: data.into(),
                file_name,
                mime,
            },
        });
        self
    }

    /// The fields, in insertion order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}

/// Custom serializer for non-JSON bodies.
pub type BodySerializer = Arc<dyn Fn(&Params) -> Result<String> + Send + Sync>;

/// Default serializer for non-JSON bodies.
pub fn form_urlencode(fields: &Params) -> Result<String> {
    let pairs: Vec<(&str, String)> = fields
        .iter()
        .map(|(key, value)| (key.as_str(), value_to_string(value)))
        .collect();
    serde_urlencoded::to_string(&pairs).map_err(|e| SdkError::Encode(e.to_string()))
}

/// Per-call options; unset fields fall back to the endpoint, then to the
/// builder.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// HTTP method for ad-hoc calls.
    pub method: Option<Method>,
    /// Call body.
    pub body: Payload,
    /// Extra headers; values may contain placeholders.
    pub headers: Vec<(String, String)>,
    /// Extra query parameters.
    pub extra_params: Params,
    /// Decode format override.
    pub response_format: Option<ResponseFormat>,
    /// Content type override (`json`, a MIME type, or an encoding name).
    pub content_type: Option<String>,
    /// Serializer for non-JSON bodies.
    pub serializer: Option<BodySerializer>,
    /// Delay between attempts.
    pub retry_delay: Option<Duration>,
    /// Additional attempts after the first.
    pub max_retries: Option<u32>,
}

impl CallOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Payload>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the extra query parameters.
    pub fn extra_params(mut self, params: Params) -> Self {
        self.extra_params = params;
        self
    }

    /// Override the decode format.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Override the decode format by name.
    pub fn response_format_named(self, name: &str) -> Result<Self> {
        Ok(self.response_format(name.parse()?))
    }

    /// Override the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Use a custom serializer for non-JSON bodies.
    pub fn serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&Params) -> Result<String> + Send + Sync + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
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

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {}", encoded))
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("method", &self.method)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("extra_params", &self.extra_params)
            .field("response_format", &self.response_format)
            .field("content_type", &self.content_type)
            .field("serializer", &self.serializer.is_some())
            .field("retry_delay", &self.retry_delay)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Body as handed to the transport.
#[derive(Debug, Clone)]
pub enum OutgoingBody {
    /// Encoded bytes.
    Bytes(Bytes),
    /// Multipart form, encoded by the transport.
    Multipart(MultipartForm),
}

/// Fully assembled request, reusable across attempts.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Final URL.
    pub url: Url,
    /// Resolved headers.
    pub headers: HeaderMap,
    /// Body; always `None` for GET-style methods.
    pub body: Option<OutgoingBody>,
}

/// Methods whose call body only feeds the query string.
pub fn is_get_style(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Encoding {
    Json,
    Form(String),
}

fn is_json_mime(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.ends_with("/json") || essence.ends_with("+json")
}

/// Per-call content type first, then the builder's declared encoding.
pub(crate) fn select_encoding(content_type: Option<&str>, declared: BodyEncoding) -> Encoding {
    let name = content_type.unwrap_or(declared.as_str());
    if name.eq_ignore_ascii_case("json") || is_json_mime(name) {
        Encoding::Json
    } else if name.contains('/') {
        Encoding::Form(name.to_string())
    } else {
        Encoding::Form(FORM_URLENCODED.to_string())
    }
}

/// Encode a non-GET body and set the matching content type.
pub(crate) fn encode_body(
    payload: &Payload,
    headers: &mut HeaderMap,
    content_type: Option<&str>,
    declared: BodyEncoding,
    serializer: Option<&BodySerializer>,
) -> Result<OutgoingBody> {
    let fields = match payload {
        Payload::Multipart(form) => {
            headers.remove(CONTENT_TYPE);
            return Ok(OutgoingBody::Multipart(form.clone()));
        }
        Payload::Fields(fields) => fields,
    };

    match select_encoding(content_type, declared) {
        Encoding::Json => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let bytes = serde_json::to_vec(fields).map_err(|e| SdkError::Encode(e.to_string()))?;
            Ok(OutgoingBody::Bytes(bytes.into()))
        }
        Encoding::Form(mime) => {
            let value = HeaderValue::from_str(&mime)
                .map_err(|e| SdkError::InvalidHeader(format!("{mime}: {e}")))?;
            headers.insert(CONTENT_TYPE, value);
            let text = match serializer {
                Some(serialize) => serialize(fields)?,
                None => form_urlencode(fields)?,
            };
            Ok(OutgoingBody::Bytes(text.into()))
        }
    }
}

/// Overlay `overrides` on `base`, matching header names case-insensitively.
pub(crate) fn merge_headers(
    base: &[(String, String)],
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged = base.to_vec();
    for (name, value) in overrides {
        match merged
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((name.clone(), value.clone())),
        }
    }
    merged
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::try_from(name.as_str())
            .map_err(|e| SdkError::InvalidHeader(format!("{name}: {e}")))?;
        let header_value = HeaderValue::try_from(value.as_str())
            .map_err(|e| SdkError::InvalidHeader(format!("{name}: {e}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Join the base URL and a resolved path. Absolute paths are used as-is.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Assembled request plus the context describing it.
#[derive(Debug, Clone)]
pub(crate) struct Assembled {
    pub(crate) request: OutgoingRequest,
    pub(crate) context: FetchContext,
}

/// Resolve placeholders, build the URL and encode the body of one call.
pub(crate) fn assemble(
    config: &SdkConfig,
    bag: Arc<ConfigBag>,
    draft: RequestDraft,
    options: &CallOptions,
) -> Result<Assembled> {
    let RequestDraft {
        endpoint_name,
        method,
        path,
        body,
        headers,
        extra_params,
    } = draft;

    let mut merged = bag.values().clone();
    if let Some(fields) = body.fields() {
        merged.extend(fields.clone());
    }
    merged.extend(extra_params.clone());

    let get_style = is_get_style(&method);
    let query_source = if get_style {
        let mut source = body.fields().cloned().unwrap_or_default();
        source.extend(extra_params.clone());
        source
    } else {
        extra_params.clone()
    };

    let header_templates = merge_headers(&config.default_headers, &headers);
    let resolver = PlaceholderResolver::new(&config.placeholders, &merged);
    let resolution = resolver.resolve(&path, &header_templates, &query_source);

    let url = Url::parse(&join_url(&config.base_url, &resolution.path))?;
    let mut resolved_headers = header_map(&resolution.headers)?;

    let outgoing_body = if get_style {
        None
    } else {
        Some(encode_body(
            &body,
            &mut resolved_headers,
            options.content_type.as_deref(),
            config.body_encoding,
            options.serializer.as_ref(),
        )?)
    };

    let context = FetchContext {
        endpoint_name,
        method: method.clone(),
        path,
        url: url.to_string(),
        body,
        headers: resolved_headers.clone(),
        extra_params,
        config: bag,
    };

    Ok(Assembled {
        request: OutgoingRequest {
            method,
            url,
            headers: resolved_headers,
            body: outgoing_body,
        },
        context,
    })
}
