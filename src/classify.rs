//! Maps a terminal non-success response onto the [`FinwiseError`] taxonomy.

use serde_json::Value;

use crate::{ApiError, FinwiseError};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Builds the failure for a non-success `status`.
///
/// `message` and `code` come from the response document's conventional
/// fields when present; classification itself never fails.
pub fn classify(status: u16, body: Option<Value>, request_id: Option<&str>) -> FinwiseError {
    let message =
        string_field(body.as_ref(), "message").unwrap_or_else(|| UNKNOWN_ERROR.to_owned());
    let code = string_field(body.as_ref(), "code");
    let retry_after = body
        .as_ref()
        .and_then(|body| body.get("retryAfter"))
        .and_then(Value::as_u64);

    let error = ApiError {
        status,
        message,
        request_id: request_id.map(str::to_owned),
        body,
        code,
    };

    match status {
        400 | 422 => FinwiseError::Validation(error),
        401 => FinwiseError::Authentication(error),
        403 => FinwiseError::PermissionDenied(error),
        404 => FinwiseError::NotFound(error),
        409 => FinwiseError::Conflict(error),
        429 => FinwiseError::RateLimit { error, retry_after },
        500..=599 => FinwiseError::Server(error),
        _ => FinwiseError::Api(error),
    }
}

/// Parses a response body leniently for error reporting.
///
/// Empty bodies become `{}`; bodies that are not JSON are kept as a JSON string.
pub(crate) fn parse_error_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

fn string_field(body: Option<&Value>, field: &str) -> Option<String> {
    body?.get(field)?.as_str().map(str::to_owned)
}
