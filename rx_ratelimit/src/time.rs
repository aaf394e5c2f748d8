use std::time::Duration;

use tokio::time::Instant;

use crate::error::RateLimitError;
use crate::error::Result;

/// Parse a fractional seconds value such as `X-RateLimit-Reset-After: 2.5`
///
/// Negative values are clamped to zero since the window has already passed.
pub fn parse_reset_after(value: &str) -> Result<Duration> {
    let secs: f64 =
        value.trim().parse().map_err(|_| RateLimitError::InvalidHeader { name: "X-RateLimit-Reset-After", value: value.to_string() })?;

    secs_to_duration(secs).ok_or_else(|| RateLimitError::InvalidHeader { name: "X-RateLimit-Reset-After", value: value.to_string() })
}

/// Convert fractional seconds to a duration, rejecting NaN, infinity and overflow
#[inline]
pub fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_nan() {
        return None;
    }
    Duration::try_from_secs_f64(secs.max(0.0)).ok()
}

/// Longest window a bucket will ever be closed for in one report
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Instant at which a window of `reset_after` starting now elapses
#[inline(always)]
pub(crate) fn deadline_after(reset_after: Duration) -> Instant {
    Instant::now() + reset_after.min(MAX_WINDOW)
}

/// Time left until `deadline`, zero once it has passed
#[inline(always)]
pub(crate) fn until(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
