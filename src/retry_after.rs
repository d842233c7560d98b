//! Server-requested lockout periods.
//!
//! A `429 Too Many Requests` or `503 Service Unavailable` response may tell the
//! client how long to stay away. When it does, the retry manager waits that long
//! (capped) instead of following its backoff schedule.

use http::{HeaderMap, StatusCode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest lockout honoured from response headers.
pub const DEFAULT_MAX_LOCKOUT: Duration = Duration::from_secs(300);

/// Lockout information extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lockout {
    /// How long to wait, from the `Retry-After` header.
    pub retry_after: Option<Duration>,

    /// When the server's limit resets (`X-RateLimit-Reset` or `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,
}

impl Lockout {
    /// Extracts lockout information from response headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use ims_orchestration::retry_after::Lockout;
    /// use http::HeaderMap;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    ///
    /// let lockout = Lockout::from_headers(&headers);
    /// assert_eq!(lockout.retry_after, Some(Duration::from_secs(60)));
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            retry_after: parse_retry_after(headers),
            reset_at: parse_reset(headers),
        }
    }

    /// Returns the wait before the next attempt, capped by `max_wait`.
    ///
    /// `Retry-After` wins over a reset timestamp; `None` when the headers carry
    /// neither or the reset time has already passed.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }

        let until_reset = self.reset_at?.duration_since(SystemTime::now()).ok()?;
        Some(until_reset.min(max_wait))
    }
}

/// Returns the server-requested wait for a response, if its status allows one.
pub fn lockout_for(status: StatusCode, headers: &HeaderMap, max_wait: Duration) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    Lockout::from_headers(headers).delay(max_wait)
}

/// Parses the Retry-After header, as delay-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date_time = httpdate::parse_http_date(header).ok()?;
    // A date in the past means "retry now".
    Some(
        date_time
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Parses X-RateLimit-Reset or RateLimit-Reset (Unix timestamp).
fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    ["x-ratelimit-reset", "ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<u64>().ok())
        .map(|timestamp| UNIX_EPOCH + Duration::from_secs(timestamp))
}
