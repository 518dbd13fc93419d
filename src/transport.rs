use std::fmt;
use std::sync::RwLock;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::BoxError;
use crate::{ClientConfig, FinwiseError, Result};

/// One physical HTTP attempt.
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<&'a Value>,
    pub query: &'a [(String, String)],
}

/// Raw response of one attempt; the body is read eagerly.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Failure to complete an attempt at the network level.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connect, send or body-read failure.
    #[error("connection failed: {0}")]
    Connect(BoxError),
    /// The attempt exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(BoxError),
    /// The connection pool was released by `close`. Never retried.
    #[error("connection pool has been released")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Box::new(err))
        } else {
            Self::Connect(Box::new(err))
        }
    }
}

/// Network seam driven by the request executor.
///
/// Implementations must be safe to share between threads issuing
/// overlapping calls.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &HttpRequest<'_>,
    ) -> std::result::Result<HttpResponse, TransportError>;

    /// Releases pooled connections. Called at most once.
    fn close(&self) {}
}

/// [`Transport`] over a pooled `reqwest` blocking client.
pub struct ReqwestTransport {
    client: RwLock<Option<reqwest::blocking::Client>>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Builds a keep-alive pool honoring the configured per-attempt timeout.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| FinwiseError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self::from_client(client))
    }

    /// Wraps a caller-supplied client.
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    fn client(&self) -> Option<reqwest::blocking::Client> {
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: &HttpRequest<'_>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let client = self.client().ok_or(TransportError::Closed)?;

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(request.query);
        }
        if let Some(body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text()?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn close(&self) {
        let released = match self.client.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(released);
    }
}
