use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderValue;
use serde::Deserialize;

use crate::{FinwiseError, Result};

/// Production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.finwiseapp.io";

/// Configures endpoint, HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// API base URL.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

/// Validated, immutable client settings.
#[derive(Clone, Eq, PartialEq)]
pub struct ClientConfig {
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ClientConfig {
    /// Validates `options` and binds them to `api_key`.
    ///
    /// Fails with [`FinwiseError::Config`] when the key is blank or not a
    /// valid header value, the timeout is zero, or the base URL is not an
    /// absolute http(s) URL.
    pub fn new(api_key: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(FinwiseError::Config("api key cannot be empty".to_owned()));
        }
        if HeaderValue::from_str(&api_key).is_err() {
            return Err(FinwiseError::Config(
                "api key contains characters not allowed in a header value".to_owned(),
            ));
        }
        if options.timeout_ms == 0 {
            return Err(FinwiseError::Config("timeout must be positive".to_owned()));
        }

        let base_url = options.base_url.trim().trim_end_matches('/').to_owned();
        let parsed = reqwest::Url::parse(&base_url).map_err(|err| {
            FinwiseError::Config(format!("invalid base url '{}': {err}", options.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FinwiseError::Config(format!(
                "base url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            api_key,
            base_url,
            timeout: Duration::from_millis(options.timeout_ms),
            max_retries: options.max_retries,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Joins the base URL and an endpoint path with a single `/`.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Client identifier sent as `User-Agent`.
    pub fn user_agent(&self) -> String {
        format!("finwise-rust/{}", env!("CARGO_PKG_VERSION"))
    }
}
