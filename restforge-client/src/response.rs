//! Raw responses, status classification and body decoding.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::FetchContext;
use crate::{Result, SdkError};

/// Response as returned by a transport, body fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    /// Create a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| SdkError::Decode(e.to_string()))
    }

    /// Body text with invalid UTF-8 replaced, for error details.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| SdkError::Decode(e.to_string()))
    }
}

/// Decode target for response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Parse as JSON.
    #[default]
    Json,
    /// UTF-8 text.
    Text,
    /// Bytes tagged with their content type.
    Blob,
    /// Plain bytes.
    Buffer,
}

impl ResponseFormat {
    /// Guess the format from a `Content-Type` header value.
    pub fn sniff(content_type: &str) -> Option<Self> {
        if content_type.contains("application/json") {
            Some(Self::Json)
        } else if content_type.contains("text/") {
            Some(Self::Text)
        } else if content_type.contains("application/octet-stream") {
            Some(Self::Buffer)
        } else if content_type.contains("image/") || content_type.contains("application/pdf") {
            Some(Self::Blob)
        } else {
            None
        }
    }

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

impl FromStr for ResponseFormat {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "blob" => Ok(Self::Blob),
            "buffer" => Ok(Self::Buffer),
            other => Err(SdkError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary body together with the content type it was served with.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Content type of the response, if present.
    pub content_type: Option<String>,
    /// Body bytes.
    pub data: Bytes,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// JSON document.
    Json(Value),
    /// Text body.
    Text(String),
    /// Bytes with content type.
    Blob(Blob),
    /// Plain bytes.
    Buffer(Bytes),
}

impl ResponseData {
    /// The JSON document, if this is a JSON result.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, if this is a text result.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The bytes of a blob or buffer result.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Blob(blob) => Some(&blob.data),
            Self::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consume into the JSON document.
    pub fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            other => Err(SdkError::Decode(format!(
                "expected a json result, got {}",
                other.format()
            ))),
        }
    }

    /// Deserialize a JSON result into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.into_json()?).map_err(|e| SdkError::Decode(e.to_string()))
    }

    /// Format this value was decoded as.
    pub fn format(&self) -> ResponseFormat {
        match self {
            Self::Json(_) => ResponseFormat::Json,
            Self::Text(_) => ResponseFormat::Text,
            Self::Blob(_) => ResponseFormat::Blob,
            Self::Buffer(_) => ResponseFormat::Buffer,
        }
    }
}

/// Pick the decode format: explicit override, then the response's content
/// type, then the builder default.
pub fn select_format(
    explicit: Option<ResponseFormat>,
    raw: &RawResponse,
    default: ResponseFormat,
) -> ResponseFormat {
    explicit
        .or_else(|| raw.content_type().and_then(ResponseFormat::sniff))
        .unwrap_or(default)
}

/// Decode a response body. Malformed bodies fail; they are never retried.
pub fn decode(raw: &RawResponse, format: ResponseFormat) -> Result<ResponseData> {
    Ok(match format {
        ResponseFormat::Json => ResponseData::Json(raw.json()?),
        ResponseFormat::Text => ResponseData::Text(raw.text()?),
        ResponseFormat::Buffer => ResponseData::Buffer(raw.bytes().clone()),
        ResponseFormat::Blob => ResponseData::Blob(Blob {
            content_type: raw.content_type().map(str::to_string),
            data: raw.bytes().clone(),
        }),
    })
}

/// Predicate over a response status, with access to the fetch context.
#[derive(Clone)]
pub struct StatusPredicate(Arc<dyn Fn(StatusCode, &FetchContext) -> bool + Send + Sync>);

impl StatusPredicate {
    /// Wrap an arbitrary predicate.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(StatusCode, &FetchContext) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Statuses in `low..=high`.
    pub fn range(low: u16, high: u16) -> Self {
        Self::new(move |status, _| (low..=high).contains(&status.as_u16()))
    }

    /// Statuses greater than or equal to `low`.
    pub fn at_least(low: u16) -> Self {
        Self::new(move |status, _| status.as_u16() >= low)
    }

    /// Exactly one status.
    pub fn equals(code: u16) -> Self {
        Self::new(move |status, _| status.as_u16() == code)
    }

    /// Any of the listed statuses.
    pub fn any_of(codes: impl Into<Vec<u16>>) -> Self {
        let codes = codes.into();
        Self::new(move |status, _| codes.contains(&status.as_u16()))
    }

    /// Matches nothing.
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Evaluate the predicate.
    pub fn matches(&self, status: StatusCode, context: &FetchContext) -> bool {
        (self.0)(status, context)
    }
}

impl fmt::Debug for StatusPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StatusPredicate")
    }
}

/// Outcome category of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Decode and return.
    Success,
    /// Re-authenticate and re-issue the call.
    AuthRequired,
    /// Server error; retry while attempts remain.
    Retryable,
    /// Bad request; fail with the body as detail.
    Terminal,
    /// Anything else; retried while attempts remain.
    Unclassified,
}

/// The status predicates of a client.
#[derive(Debug, Clone)]
pub struct StatusRules {
    /// Success statuses (default 200-299).
    pub validate: StatusPredicate,
    /// Retryable statuses (default >= 500).
    pub retry: StatusPredicate,
    /// Statuses requiring re-authentication (default 401).
    pub auth_check: StatusPredicate,
    /// Terminal client errors (default 400).
    pub terminal: StatusPredicate,
}

impl Default for StatusRules {
    fn default() -> Self {
        Self {
            validate: StatusPredicate::range(200, 299),
            retry: StatusPredicate::at_least(500),
            auth_check: StatusPredicate::equals(401),
            terminal: StatusPredicate::equals(400),
        }
    }
}

impl StatusRules {
    /// Classify a status; the auth check wins over success, success over
    /// retry, retry over terminal.
    pub fn classify(&self, status: StatusCode, context: &FetchContext) -> Classification {
        if self.auth_check.matches(status, context) {
            Classification::AuthRequired
        } else if self.validate.matches(status, context) {
            Classification::Success
        } else if self.retry.matches(status, context) {
            Classification::Retryable
        } else if self.terminal.matches(status, context) {
            Classification::Terminal
        } else {
            Classification::Unclassified
        }
    }
}
