//! Retry rules for opening a stream.
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

const BASE: Duration = Duration::from_millis(200);
const RATE_LIMIT_FLOOR: Duration = Duration::from_millis(1100);

/// 429 and every 5xx are worth another attempt; other statuses are final.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Seconds form of `Retry-After`. HTTP dates are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}

/// Delay before retry number `retry` (1-based).
///
/// A server-provided `Retry-After` wins. Otherwise 200 ms doubling per retry,
/// never below 1.1 s for a 429.
///
/// ```
/// use reqwest::StatusCode;
/// use std::time::Duration;
/// use t2m_http::retry::delay;
///
/// assert_eq!(delay(None, None, 3), Duration::from_millis(800));
/// assert_eq!(delay(Some(StatusCode::TOO_MANY_REQUESTS), None, 1), Duration::from_millis(1100));
/// assert_eq!(delay(Some(StatusCode::BAD_GATEWAY), Some(Duration::from_secs(7)), 1), Duration::from_secs(7));
/// ```
pub fn delay(status: Option<StatusCode>, retry_after: Option<Duration>, retry: usize) -> Duration {
    if let Some(d) = retry_after {
        return d;
    }
    let exp = BASE * (1u32 << retry.saturating_sub(1).min(16));
    if status == Some(StatusCode::TOO_MANY_REQUESTS) {
        exp.max(RATE_LIMIT_FLOOR)
    } else {
        exp
    }
}
