//! Limiter parameters supplied per protected route.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, SuperbanError};

/// Longest decay or ban window accepted, one hundred years.
pub const MAX_WINDOW_MINUTES: u64 = 100 * 365 * 24 * 60;

/// Per-route limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Attempts allowed inside one decay window
    pub max_attempts: u64,
    /// Length of the attempt-counter window
    pub decay_minutes: u64,
    /// How long an identity stays banned once the limit is breached
    pub banned_minutes: u64,
}

impl Limits {
    /// Create validated limits.
    pub fn new(max_attempts: u64, decay_minutes: u64, banned_minutes: u64) -> Result<Self> {
        let limits = Self {
            max_attempts,
            decay_minutes,
            banned_minutes,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Check that these limits describe a usable policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SuperbanError::InvalidLimits(
                "max_attempts must be positive".to_string(),
            ));
        }
        if self.decay_minutes == 0 {
            return Err(SuperbanError::InvalidLimits(
                "decay_minutes must be positive".to_string(),
            ));
        }
        if self.banned_minutes == 0 {
            return Err(SuperbanError::InvalidLimits(
                "banned_minutes must be positive".to_string(),
            ));
        }
        if self.decay_minutes > MAX_WINDOW_MINUTES || self.banned_minutes > MAX_WINDOW_MINUTES {
            return Err(SuperbanError::InvalidLimits(format!(
                "windows are capped at {} minutes",
                MAX_WINDOW_MINUTES
            )));
        }
        Ok(())
    }

    /// The attempt-counter window.
    pub fn decay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.decay_minutes.saturating_mul(60))
    }

    /// How long the ban store should keep a ban record.
    pub fn ban_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.banned_minutes.saturating_mul(60))
    }

    /// When a ban triggered at `now` ends.
    ///
    /// Fails instead of overflowing when the window runs past the last
    /// representable instant, which only unvalidated limits can do.
    pub fn ban_end(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        i64::try_from(self.banned_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .and_then(|ban| now.checked_add_signed(ban))
            .ok_or_else(|| {
                SuperbanError::InvalidLimits(format!(
                    "banned_minutes {} runs past the end of time",
                    self.banned_minutes
                ))
            })
    }
}

/// Parse the middleware parameter form `max_attempts,decay_minutes,banned_minutes`.
impl FromStr for Limits {
    type Err = SuperbanError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(SuperbanError::InvalidLimits(format!(
                "expected `max_attempts,decay_minutes,banned_minutes`, got {:?}",
                s
            )));
        }

        let field = |name: &str, raw: &str| -> Result<u64> {
            raw.parse::<u64>().map_err(|e| {
                SuperbanError::InvalidLimits(format!("{} {:?}: {}", name, raw, e))
            })
        };

        Limits::new(
            field("max_attempts", parts[0])?,
            field("decay_minutes", parts[1])?,
            field("banned_minutes", parts[2])?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_middleware_parameters() {
        let limits: Limits = "200,2,1440".parse().unwrap();
        assert_eq!(limits, Limits::new(200, 2, 1440).unwrap());
        assert_eq!(limits.decay(), std::time::Duration::from_secs(120));
        assert_eq!(limits.ban_ttl(), std::time::Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let limits: Limits = " 5, 1 ,10 ".parse().unwrap();
        assert_eq!(limits.max_attempts, 5);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!("200,2".parse::<Limits>().is_err());
        assert!("200,2,1440,7".parse::<Limits>().is_err());
        assert!("a,2,1440".parse::<Limits>().is_err());
        assert!("-1,2,1440".parse::<Limits>().is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(matches!(Limits::new(0, 2, 1440), Err(SuperbanError::InvalidLimits(_))));
        assert!(matches!(Limits::new(1, 0, 1440), Err(SuperbanError::InvalidLimits(_))));
        assert!(matches!(Limits::new(1, 2, 0), Err(SuperbanError::InvalidLimits(_))));
    }

    #[test]
    fn test_oversized_window_rejected() {
        assert!(Limits::new(1, u64::MAX, 1).is_err());
        assert!(Limits::new(1, 1, u64::MAX).is_err());
        assert!(Limits::new(1, 1, 1_000_000_000_000).is_err());
        assert!(Limits::new(1, 1_000_000_000_000, 1).is_err());
        assert!(Limits::new(1, MAX_WINDOW_MINUTES, MAX_WINDOW_MINUTES).is_ok());
    }

    #[test]
    fn test_ban_end() {
        use chrono::TimeZone;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let limits = Limits::new(200, 2, 1440).unwrap();
        assert_eq!(limits.ban_end(now).unwrap(), now + chrono::Duration::days(1));

        let limits = Limits::new(1, 1, MAX_WINDOW_MINUTES).unwrap();
        assert!(limits.ban_end(now).is_ok());

        // Built without validation
        let unchecked = Limits {
            max_attempts: 1,
            decay_minutes: 1,
            banned_minutes: 1_000_000_000_000,
        };
        assert!(matches!(unchecked.ban_end(now), Err(SuperbanError::InvalidLimits(_))));
        assert!(matches!(
            Limits { banned_minutes: u64::MAX, ..unchecked }.ban_end(now),
            Err(SuperbanError::InvalidLimits(_))
        ));
    }
}
