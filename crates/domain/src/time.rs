//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp used for message times, request deadlines and scheduled events.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Return the timestamp `delay` after `from`, saturating on overflow.
#[must_use]
pub fn after(from: Timestamp, delay: Duration) -> Timestamp {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time remaining until `at`; zero when `at` is already in the past.
#[must_use]
pub fn until(at: Timestamp) -> Duration {
    (at - now()).to_std().unwrap_or(Duration::ZERO)
}
