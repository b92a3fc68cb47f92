//! Clock helpers.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Horizon that delays too large to represent are clamped to.
pub const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Milliseconds since the Unix epoch, or 0 if the system clock is before it.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// `start + delay`, clamped to [`FAR_FUTURE`] when the sum does not fit.
///
/// `Duration::MAX` therefore means "effectively never" instead of a panic.
#[must_use]
pub fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
