use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use crate::{ClientConfig, ClientOptions, FinwiseError, RequestExecutor, Result};

/// Environment variable read by [`FinwiseClient::from_env`].
pub const API_KEY_ENV: &str = "FINWISE_API_KEY";

#[derive(Clone)]
/// Blocking client for the FinWise REST API.
///
/// Clones share one connection pool and one closed flag.
pub struct FinwiseClient {
    executor: Arc<RequestExecutor>,
}

impl fmt::Debug for FinwiseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinwiseClient")
            .field("base_url", &self.executor.config().base_url())
            .field("api_key", &"<redacted>")
            .field("closed", &self.executor.is_closed())
            .finish()
    }
}

impl FinwiseClient {
    /// Creates a client with default options.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use finwise::FinwiseClient;
    ///
    /// let client = FinwiseClient::new("my-api-key")?;
    /// let accounts = client.get("/accounts", None)?;
    /// client.close();
    /// # Ok::<(), finwise::FinwiseError>(())
    /// ```
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, ClientOptions::default())
    }

    /// Creates a client with explicit endpoint, timeout and retry options.
    pub fn with_options(api_key: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let config = ClientConfig::new(api_key, options)?;
        Ok(Self::from_executor(RequestExecutor::new(config)?))
    }

    /// Creates a client from the `FINWISE_API_KEY` environment variable.
    ///
    /// Returns [`FinwiseError::Config`] if the variable is missing or empty.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            FinwiseError::Config(format!("missing {API_KEY_ENV} environment variable"))
        })?;
        if api_key.trim().is_empty() {
            return Err(FinwiseError::Config(format!("{API_KEY_ENV} is set but empty")));
        }
        Self::new(api_key)
    }

    /// Wraps a preconfigured executor, e.g. one with a custom transport.
    pub fn from_executor(executor: RequestExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        self.executor.execute(method, path, body, query)
    }

    pub fn get(&self, path: &str, query: Option<&[(String, String)]>) -> Result<Value> {
        self.executor.get(path, query)
    }

    pub fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        self.executor.post(path, body, query)
    }

    pub fn patch(
        &self,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        self.executor.patch(path, body, query)
    }

    pub fn delete(&self, path: &str, query: Option<&[(String, String)]>) -> Result<Value> {
        self.executor.delete(path, query)
    }

    /// Releases the connection pool for this client and all of its clones.
    pub fn close(&self) {
        self.executor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }
}
