//! HTTP transport seam.
//!
//! The call controller only needs "send this request, give me status,
//! headers and body". [`ReqwestTransport`] is the production implementation;
//! tests can plug in anything implementing [`Transport`].

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::request::{MultipartForm, OutgoingBody, OutgoingRequest, PartContent};
use crate::response::RawResponse;
use crate::{Result, SdkError};

/// Sends one fully assembled request.
///
/// Dropping the returned future must abort the exchange; the call controller
/// relies on this to enforce per-attempt timeouts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and read the whole response body.
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse>;
}

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Enable brotli decompression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects.
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            user_agent: format!("restforge/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given connection settings.
    ///
    /// No overall request timeout is set here; deadlines are applied per
    /// attempt by the caller.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let inner = builder
            .build()
            .map_err(|e| SdkError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse> {
        let OutgoingRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.inner.request(method, url).headers(headers);
        match body {
            Some(OutgoingBody::Bytes(bytes)) => builder = builder.body(bytes),
            Some(OutgoingBody::Multipart(form)) => builder = builder.multipart(multipart(&form)?),
            None => {}
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(status = %status, bytes = body.len(), "Received HTTP response");

        Ok(RawResponse::new(status, headers, body))
    }
}

fn multipart(form: &MultipartForm) -> Result<reqwest::multipart::Form> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts() {
        out = match &part.content {
            PartContent::Text(value) => out.text(part.name.clone(), value.clone()),
            PartContent::File {
                data,
                file_name,
                mime,
            } => {
                let mut file = reqwest::multipart::Part::bytes(data.to_vec());
                if let Some(name) = file_name {
                    file = file.file_name(name.clone());
                }
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| SdkError::Encode(format!("invalid part MIME type {mime}: {e}")))?;
                }
                out.part(part.name.clone(), file)
            }
        };
    }
    Ok(out)
}
