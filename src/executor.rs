use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::backoff::{self, Sleeper, ThreadSleeper};
use crate::classify::{classify, parse_error_body};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
use crate::{ApiError, ClientConfig, FinwiseError, Result};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "request-id";

/// Runs logical API calls through the retrying attempt loop.
///
/// 429, 5xx, connection failures and timeouts share one retry budget of
/// `max_retries` per call. Any other non-success status fails immediately.
pub struct RequestExecutor {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    closed: AtomicBool,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// State of one logical call; never shared between calls.
struct AttemptContext<'a> {
    request_id: String,
    method: Method,
    path: &'a str,
    body: Option<&'a Value>,
    query: &'a [(String, String)],
    attempt: u32,
    waited: Duration,
}

/// What the loop does after one attempt.
enum Step {
    Done(Result<Value>),
    Retry { wait: Duration, reason: String },
}

impl RequestExecutor {
    /// Creates an executor over a pooled `reqwest` blocking client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates an executor over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
            sleeper: Box::new(ThreadSleeper),
            closed: AtomicBool::new(false),
        }
    }

    /// Replaces how backoff waits are performed.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get(&self, path: &str, query: Option<&[(String, String)]>) -> Result<Value> {
        self.execute(Method::GET, path, None, query)
    }

    pub fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        self.execute(Method::POST, path, body, query)
    }

    pub fn patch(
        &self,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        self.execute(Method::PATCH, path, body, query)
    }

    pub fn delete(&self, path: &str, query: Option<&[(String, String)]>) -> Result<Value> {
        self.execute(Method::DELETE, path, None, query)
    }

    /// Executes one logical call and returns the parsed response document.
    ///
    /// Success bodies that are empty yield `{}`. Every attempt of the call
    /// sends the same `Request-Id`, which is also attached to the error.
    /// A call in flight when [`close`](Self::close) runs stops before its
    /// next attempt with [`FinwiseError::Closed`].
    pub fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: Option<&[(String, String)]>,
    ) -> Result<Value> {
        let mut ctx = AttemptContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            path,
            body,
            query: query.unwrap_or(&[]),
            attempt: 0,
            waited: Duration::ZERO,
        };
        let headers = self.headers(&ctx.request_id)?;

        loop {
            if self.is_closed() {
                return Err(FinwiseError::Closed);
            }

            let has_budget = ctx.attempt < self.config.max_retries();
            let request = HttpRequest {
                method: ctx.method.clone(),
                url: self.config.endpoint_url(ctx.path),
                headers: headers.clone(),
                body: ctx.body,
                query: ctx.query,
            };

            let step = match self.transport.send(&request) {
                Ok(response) => self.on_response(&ctx, response, has_budget),
                Err(err) => self.on_transport_error(&ctx, err, has_budget),
            };

            match step {
                Step::Done(outcome) => {
                    #[cfg(feature = "tracing")]
                    if let Err(err) = &outcome {
                        if ctx.attempt > 0 {
                            tracing::warn!(
                                request_id = %ctx.request_id,
                                method = %ctx.method,
                                path = ctx.path,
                                attempts = ctx.attempt + 1,
                                waited_ms = ctx.waited.as_millis() as u64,
                                "request failed after retries: {err}"
                            );
                        }
                    }
                    return outcome;
                }
                Step::Retry { wait, reason } => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        method = %ctx.method,
                        path = ctx.path,
                        attempt = ctx.attempt,
                        wait_secs = wait.as_secs(),
                        "retrying request: {reason}"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = reason;

                    self.sleeper.sleep(wait);
                    ctx.waited += wait;
                    ctx.attempt += 1;
                }
            }
        }
    }

    /// Releases the transport. Only the first call has an effect; later
    /// calls to [`execute`](Self::execute) fail with [`FinwiseError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.transport.close();
            #[cfg(feature = "tracing")]
            tracing::debug!(base_url = self.config.base_url(), "finwise client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_response(
        &self,
        ctx: &AttemptContext<'_>,
        response: HttpResponse,
        has_budget: bool,
    ) -> Step {
        let status = response.status;

        if status.is_success() {
            return Step::Done(parse_success_body(&response.body, &ctx.request_id));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let hint = backoff::retry_after_secs(&response.headers);
            if has_budget {
                return Step::Retry {
                    wait: backoff::rate_limited(ctx.attempt, hint),
                    reason: format!("rate limited, retry-after {hint}s"),
                };
            }
            let body = parse_error_body(&response.body);
            return Step::Done(Err(FinwiseError::RateLimit {
                error: ApiError {
                    status: status.as_u16(),
                    message: "Rate limit exceeded".to_owned(),
                    request_id: Some(ctx.request_id.clone()),
                    code: body.get("code").and_then(Value::as_str).map(str::to_owned),
                    body: Some(body),
                },
                retry_after: Some(hint),
            }));
        }

        if status.as_u16() >= 500 && has_budget {
            return Step::Retry {
                wait: backoff::exponential(ctx.attempt),
                reason: format!("server error {status}"),
            };
        }

        let body = parse_error_body(&response.body);
        Step::Done(Err(classify(status.as_u16(), Some(body), Some(&ctx.request_id))))
    }

    fn on_transport_error(
        &self,
        ctx: &AttemptContext<'_>,
        err: TransportError,
        has_budget: bool,
    ) -> Step {
        if matches!(err, TransportError::Closed) {
            return Step::Done(Err(FinwiseError::Closed));
        }
        if has_budget {
            return Step::Retry {
                wait: backoff::exponential(ctx.attempt),
                reason: err.to_string(),
            };
        }

        let request_id = ctx.request_id.clone();
        let failure = match err {
            TransportError::Timeout(source) => FinwiseError::Timeout {
                message: format!("request timed out after {:?}", self.config.timeout()),
                request_id,
                source,
            },
            TransportError::Connect(source) => FinwiseError::Connection {
                message: format!("failed to connect to {}: {source}", self.config.base_url()),
                request_id,
                source,
            },
            TransportError::Closed => FinwiseError::Closed,
        };
        Step::Done(Err(failure))
    }

    fn headers(&self, request_id: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, header_value(self.config.api_key())?);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::USER_AGENT, header_value(&self.config.user_agent())?);
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), header_value(request_id)?);
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| FinwiseError::Config(format!("invalid header value: {err}")))
}

fn parse_success_body(body: &str, request_id: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(body).map_err(|err| FinwiseError::Decode {
        message: format!("invalid response JSON: {err}; body: {body}"),
        request_id: request_id.to_owned(),
    })
}
