use std::fmt;

use serde_json::Value;

/// Boxed underlying cause of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a terminal failure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    PermissionDenied,
    NotFound,
    Conflict,
    RateLimit,
    ServerError,
    /// Non-success status outside the known table.
    Api,
    Connection,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Api => "api",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Details of a non-success HTTP response.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Message from the response `message` field, or a generic fallback.
    pub message: String,
    /// Correlation id sent as `Request-Id` with every attempt of the call.
    pub request_id: Option<String>,
    /// Raw response document, if the response carried one.
    pub body: Option<Value>,
    /// API-specific error code from the response `code` field.
    pub code: Option<String>,
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FinwiseError {
    /// Invalid client configuration, rejected at construction.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The client was closed before the call was issued.
    #[error("client has been closed")]
    Closed,
    /// HTTP 400 or 422.
    #[error("validation error (HTTP {}): {}", .0.status, .0.message)]
    Validation(ApiError),
    /// HTTP 401.
    #[error("authentication error (HTTP {}): {}", .0.status, .0.message)]
    Authentication(ApiError),
    /// HTTP 403.
    #[error("permission denied (HTTP {}): {}", .0.status, .0.message)]
    PermissionDenied(ApiError),
    /// HTTP 404.
    #[error("not found (HTTP {}): {}", .0.status, .0.message)]
    NotFound(ApiError),
    /// HTTP 409.
    #[error("conflict (HTTP {}): {}", .0.status, .0.message)]
    Conflict(ApiError),
    /// HTTP 429, surfaced once the retry budget is spent.
    #[error("rate limit exceeded (HTTP {}): {}", .error.status, .error.message)]
    RateLimit {
        error: ApiError,
        /// Seconds the server asked the client to wait.
        retry_after: Option<u64>,
    },
    /// HTTP 5xx.
    #[error("server error (HTTP {}): {}", .0.status, .0.message)]
    Server(ApiError),
    /// Any other non-success HTTP status.
    #[error("api error (HTTP {}): {}", .0.status, .0.message)]
    Api(ApiError),
    /// The server could not be reached.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        request_id: String,
        #[source]
        source: BoxError,
    },
    /// An attempt exceeded the configured timeout.
    #[error("timeout: {message}")]
    Timeout {
        message: String,
        request_id: String,
        #[source]
        source: BoxError,
    },
    /// A success response body was not valid JSON.
    #[error("decode error: {message}")]
    Decode { message: String, request_id: String },
}

impl FinwiseError {
    /// Returns the failure classification, or `None` for errors raised
    /// outside the request pipeline (configuration, closed client, decoding).
    pub fn kind(&self) -> Option<ErrorKind> {
        let kind = match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Server(_) => ErrorKind::ServerError,
            Self::Api(_) => ErrorKind::Api,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Config(_) | Self::Closed | Self::Decode { .. } => return None,
        };
        Some(kind)
    }

    /// Returns the HTTP response details for status-derived failures.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Validation(error)
            | Self::Authentication(error)
            | Self::PermissionDenied(error)
            | Self::NotFound(error)
            | Self::Conflict(error)
            | Self::Server(error)
            | Self::Api(error)
            | Self::RateLimit { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Correlation id of the logical call that failed.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Connection { request_id, .. }
            | Self::Timeout { request_id, .. }
            | Self::Decode { request_id, .. } => Some(request_id),
            _ => self.api_error().and_then(|error| error.request_id.as_deref()),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.api_error().map(|error| error.status)
    }

    pub fn response_body(&self) -> Option<&Value> {
        self.api_error().and_then(|error| error.body.as_ref())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.api_error().and_then(|error| error.code.as_deref())
    }

    /// Server-suggested wait in seconds, only set for rate-limit failures.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
