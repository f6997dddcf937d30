//! Time and timestamp helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// UTC timestamp used for startup stamps, cron fire times and empty-since marks.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Time elapsed from `earlier` to `later`, saturating at zero.
#[must_use]
pub fn elapsed_between(earlier: Timestamp, later: Timestamp) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_saturate_at_zero_when_later_precedes_earlier() {
        let a = now();
        let b = a - chrono::Duration::seconds(5);
        assert_eq!(elapsed_between(a, b), Duration::ZERO);
        assert_eq!(elapsed_between(b, a), Duration::from_secs(5));
    }
}
