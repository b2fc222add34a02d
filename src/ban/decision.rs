//! Admission decisions and the rejection payload surfaced to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status code a web deployment should answer a rejection with.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Format of the ban expiry inside the rejection message.
const MESSAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the request through.
    Allow,
    /// Refuse the request; the identity is banned until the given instant.
    Reject { banned_until: DateTime<Utc> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// The ban expiry, when rejected.
    pub fn banned_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Decision::Allow => None,
            Decision::Reject { banned_until } => Some(*banned_until),
        }
    }

    /// The payload to hand back to a rejected caller.
    pub fn rejection(&self) -> Option<Rejection> {
        self.banned_until().map(Rejection::new)
    }
}

/// Protocol-agnostic rejection for a banned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// "Too many requests" status signal
    #[serde(skip)]
    pub status: u16,
    /// Human readable message naming the ban expiry
    pub message: String,
    /// The ban expiry itself
    #[serde(skip)]
    pub banned_until: DateTime<Utc>,
}

impl Rejection {
    pub fn new(banned_until: DateTime<Utc>) -> Self {
        Self {
            status: TOO_MANY_REQUESTS,
            message: format!(
                "You have been banned until {}",
                banned_until.format(MESSAGE_TIME_FORMAT)
            ),
            banned_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_allow_has_no_rejection() {
        assert!(Decision::Allow.is_allowed());
        assert_eq!(Decision::Allow.banned_until(), None);
        assert!(Decision::Allow.rejection().is_none());
    }

    #[test]
    fn test_rejection_message() {
        let until = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 1).unwrap();
        let decision = Decision::Reject { banned_until: until };

        let rejection = decision.rejection().unwrap();
        assert_eq!(rejection.status, 429);
        assert_eq!(rejection.message, "You have been banned until 2024-03-09 17:05:01");
        assert_eq!(rejection.banned_until, until);
    }

    #[test]
    fn test_rejection_body_shape() {
        let until = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 1).unwrap();
        let body = serde_json::to_value(Rejection::new(until)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "message": "You have been banned until 2024-03-09 17:05:01" })
        );
    }
}
