//! Wait schedule between retry attempts.
//!
//! The schedule is deterministic: `2^attempt` seconds, no jitter. Rate-limited
//! attempts wait the smaller of that and the server's `Retry-After` hint.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Hint used when a 429 response has no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Wait before retrying after a 5xx, connection failure or timeout.
///
/// `attempt` is 0-based (0 = first attempt).
pub fn exponential(attempt: u32) -> Duration {
    Duration::from_secs(exponential_secs(attempt))
}

/// Wait before retrying after a 429 carrying `hint_secs`.
pub fn rate_limited(attempt: u32, hint_secs: u64) -> Duration {
    Duration::from_secs(hint_secs.min(exponential_secs(attempt)))
}

/// Reads `Retry-After` as an integer count of seconds.
///
/// Missing or non-numeric values (including HTTP dates) fall back to
/// [`DEFAULT_RETRY_AFTER_SECS`].
pub fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

fn exponential_secs(attempt: u32) -> u64 {
    1u64.checked_shl(attempt).unwrap_or(u64::MAX)
}

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
