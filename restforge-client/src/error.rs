//! SDK error types.

use restforge_cache::CacheError;
use std::time::Duration;
use thiserror::Error;

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors surfaced by a logical call.
///
/// Transport failures and retryable statuses are absorbed by the retry loop;
/// a caller only sees one of these once the loop has given up or the failure
/// is terminal.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The last attempt exceeded its deadline.
    #[error("Request timed out after {timeout:?} ({attempts} attempts)")]
    Timeout {
        /// Per-attempt deadline.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Authentication was required but no hook exists, or the hook failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Every attempt was consumed without success.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Status of the last response, if any response was received.
        status: Option<u16>,
        /// Last error message or response body.
        message: String,
    },

    /// A non-retryable bad response.
    #[error("HTTP Error: {status} {body}")]
    TerminalClient {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The requested decode target is not known.
    #[error("Unsupported response format: {0}")]
    UnsupportedFormat(String),

    /// Dispatch to a name that was never registered.
    #[error("Endpoint {0} not registered")]
    UnregisteredEndpoint(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request body could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The final URL is not valid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A resolved header name or value is not valid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The transport failed before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A function endpoint returned an error.
    #[error("Endpoint function {name} failed: {message}")]
    Function {
        /// Registered name of the function.
        name: String,
        /// Error message.
        message: String,
    },

    /// A request interceptor rejected the request.
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// Invalid builder configuration or settings file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cache store failure.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl SdkError {
    /// Check if the retry loop would retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this is an authentication error.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Get the HTTP status code if the failure came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TerminalClient { status, .. } => Some(*status),
            Self::RetryExhausted { status, .. } => *status,
            _ => None,
        }
    }

    /// Number of attempts made, for failures raised by the retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Timeout { attempts, .. } | Self::RetryExhausted { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}
