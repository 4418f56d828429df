//! File and environment based client settings.
//!
//! ```toml
//! base_url = "https://api.weixin.qq.com"
//! timeout_ms = 3000
//! body_encoding = "json"
//!
//! [placeholders]
//! access_token = "{access_token}"
//!
//! [endpoints]
//! getUserInfo = "GET /cgi-bin/user/info"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT, SdkConfig, SdkConfigBuilder,
};
use crate::context::Params;
use crate::placeholder::value_to_string;
use crate::registry::parse_method;
use crate::request::BodyEncoding;
use crate::response::ResponseFormat;
use crate::{Result, SdkError};

/// Environment variable prefix used by [`SdkSettings::load`].
pub const DEFAULT_ENV_PREFIX: &str = "RESTFORGE";

/// Supported settings file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

impl SettingsFormat {
    /// Pick a format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Serializable subset of the client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    /// Base URL.
    pub base_url: String,
    /// Default headers.
    pub default_headers: Params,
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    /// Declared body encoding.
    pub body_encoding: BodyEncoding,
    /// Fallback decode format.
    pub response_format: ResponseFormat,
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Method of endpoints registered without one.
    pub default_method: Option<String>,
    /// Placeholder name to source.
    pub placeholders: Params,
    /// Initial config bag.
    pub config: Params,
    /// Route table: `name = "METHOD /path"`.
    pub endpoints: Params,
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_headers: Params::new(),
            timeout_ms: millis(DEFAULT_TIMEOUT),
            body_encoding: BodyEncoding::Json,
            response_format: ResponseFormat::Json,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: millis(DEFAULT_RETRY_DELAY),
            default_method: None,
            placeholders: Params::new(),
            config: Params::new(),
            endpoints: Params::new(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl SdkSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SdkError::Config(format!("JSON parse error: {}", e)))
    }

    /// Parse settings from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SdkError::Config(format!("TOML parse error: {}", e)))
    }

    /// Load settings from a file, picking the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| SdkError::Config("No file extension found".to_string()))?;
        let format = SettingsFormat::from_extension(ext)
            .ok_or_else(|| SdkError::Config(format!("Unsupported format: {}", ext)))?;

        let content = fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        match format {
            SettingsFormat::Json => Self::from_json_str(&content),
            SettingsFormat::Toml => Self::from_toml_str(&content),
        }
    }

    /// Apply `{PREFIX}_BASE_URL`, `{PREFIX}_TIMEOUT_MS`, `{PREFIX}_MAX_RETRIES`
    /// and `{PREFIX}_RETRY_DELAY_MS` from `lookup`.
    pub fn apply_overrides<F>(&mut self, prefix: &str, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{}_{}", prefix, name);

        if let Some(url) = lookup(&key("BASE_URL")) {
            self.base_url = url;
        }
        if let Some(value) = lookup(&key("TIMEOUT_MS")) {
            self.timeout_ms = parse_number(&key("TIMEOUT_MS"), &value)?;
        }
        if let Some(value) = lookup(&key("MAX_RETRIES")) {
            self.max_retries = parse_number(&key("MAX_RETRIES"), &value)?;
        }
        if let Some(value) = lookup(&key("RETRY_DELAY_MS")) {
            self.retry_delay_ms = parse_number(&key("RETRY_DELAY_MS"), &value)?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self, prefix: &str) -> Result<()> {
        self.apply_overrides(prefix, |name| std::env::var(name).ok())
    }

    /// Load a `.env` file if present, then the settings file, then
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        let mut settings = Self::from_file(path)?;
        settings.apply_env(prefix)?;
        Ok(settings)
    }

    /// Turn the settings into a builder; the route table is registered when
    /// the client is created.
    pub fn into_builder(self) -> Result<SdkConfigBuilder> {
        let mut builder = SdkConfig::builder(self.base_url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .body_encoding(self.body_encoding)
            .response_format(self.response_format)
            .max_retries(self.max_retries)
            .retry_delay(Duration::from_millis(self.retry_delay_ms))
            .config(self.config);

        if let Some(method) = &self.default_method {
            builder = builder.default_method(parse_method(method)?);
        }
        for (name, value) in &self.default_headers {
            builder = builder.default_header(name.as_str(), value_to_string(value));
        }
        for (name, source) in &self.placeholders {
            builder = builder.placeholder(name.as_str(), value_to_string(source));
        }
        for (name, route) in self.endpoints {
            match route {
                Value::String(route) => builder = builder.endpoint(name, route),
                other => {
                    return Err(SdkError::Config(format!(
                        "endpoint {name} must be a \"METHOD /path\" string, got {other}"
                    )));
                }
            }
        }
        Ok(builder)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SdkError::Config(format!("{name} must be a number, got {value:?}")))
}
