//! Fixed-window attempt counter.

use chrono::{DateTime, Duration, Utc};

/// Attempts registered for one identity inside a decay window.
///
/// The window opens on the first hit and lasts `decay`; once it has
/// elapsed the counter reads as zero and the next hit opens a fresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCounter {
    /// Hits registered in the current window
    count: u64,
    /// When the current window closes
    window_expiry: DateTime<Utc>,
}

impl AttemptCounter {
    /// Open a window at `now` with no hits.
    ///
    /// A window reaching past the last representable instant never closes.
    pub fn new(now: DateTime<Utc>, decay: Duration) -> Self {
        Self {
            count: 0,
            window_expiry: now
                .checked_add_signed(decay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the window has closed. The window is exclusive of its end.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_expiry
    }

    /// Register one hit, opening a new window first if this one has closed.
    ///
    /// Returns the count after the hit.
    pub fn hit(&mut self, now: DateTime<Utc>, decay: Duration) -> u64 {
        if self.is_expired(now) {
            *self = Self::new(now, decay);
        }
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Hits in the current window.
    pub fn count(&self, now: DateTime<Utc>) -> u64 {
        if self.is_expired(now) {
            0
        } else {
            self.count
        }
    }

    /// Whether `max_attempts` have been used up in the current window.
    pub fn exceeded(&self, now: DateTime<Utc>, max_attempts: u64) -> bool {
        self.count(now) >= max_attempts
    }

    /// Attempts left before the limit is reached.
    pub fn remaining(&self, now: DateTime<Utc>, max_attempts: u64) -> u64 {
        max_attempts.saturating_sub(self.count(now))
    }

    /// When the current window closes.
    pub fn window_expiry(&self) -> DateTime<Utc> {
        self.window_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_counter_hit_within_window() {
        let mut counter = AttemptCounter::new(start(), Duration::minutes(2));

        assert_eq!(counter.hit(start(), Duration::minutes(2)), 1);
        assert_eq!(counter.hit(start() + Duration::seconds(30), Duration::minutes(2)), 2);
        assert_eq!(counter.count(start() + Duration::seconds(60)), 2);
        assert_eq!(counter.remaining(start(), 10), 8);
    }

    #[test]
    fn test_counter_exceeded_at_max() {
        let mut counter = AttemptCounter::new(start(), Duration::minutes(1));

        for _ in 0..4 {
            counter.hit(start(), Duration::minutes(1));
            assert!(!counter.exceeded(start(), 5));
        }

        // The 5th hit uses up the limit
        counter.hit(start(), Duration::minutes(1));
        assert!(counter.exceeded(start(), 5));
        assert_eq!(counter.remaining(start(), 5), 0);
    }

    #[test]
    fn test_window_past_end_of_time_saturates() {
        let decay = Duration::days(1_000_000_000);
        let mut counter = AttemptCounter::new(start(), decay);

        assert_eq!(counter.window_expiry(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(counter.hit(start(), decay), 1);
        assert!(!counter.is_expired(start() + Duration::days(365 * 1000)));
    }

    #[test]
    fn test_counter_resets_after_window() {
        let decay = Duration::minutes(2);
        let mut counter = AttemptCounter::new(start(), decay);
        counter.hit(start(), decay);
        counter.hit(start(), decay);

        let later = start() + decay;
        assert!(counter.is_expired(later));
        assert_eq!(counter.count(later), 0);

        // A hit after the window opens a fresh one anchored at that hit
        assert_eq!(counter.hit(later, decay), 1);
        assert_eq!(counter.window_expiry(), later + decay);
    }
}
