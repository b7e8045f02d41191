//! Replay-guard entries.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single-use nonce bound to a delivered access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    pub value: String,
    pub bound_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Nonce {
    /// An expiry in the past, or exactly now, is invalid.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// A recorded client-assertion JWT ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub jti: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub active: bool,
}

impl AssertionRecord {
    /// Active and not yet expired, so a reuse would be a replay.
    #[must_use]
    pub fn is_within_window(&self, now: OffsetDateTime) -> bool {
        self.active && self.expires_at > now
    }
}

/// Outcome of a JTI replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    /// The JTI is inside its replay window.
    Known,
    /// Unseen or expired; safe to record.
    Free,
}

impl ReplayStatus {
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_nonce_expiry_is_exclusive_of_now() {
        let nonce = Nonce {
            value: "n".into(),
            bound_token: "t".into(),
            expires_at: datetime!(2024-03-01 12:00 UTC),
        };
        assert!(!nonce.is_expired(datetime!(2024-03-01 11:59:59 UTC)));
        assert!(nonce.is_expired(datetime!(2024-03-01 12:00 UTC)));
    }

    #[test]
    fn test_inactive_assertion_is_outside_window() {
        let mut record = AssertionRecord {
            jti: "j".into(),
            expires_at: datetime!(2024-03-01 12:00 UTC),
            active: true,
        };
        let now = datetime!(2024-03-01 11:00 UTC);
        assert!(record.is_within_window(now));
        record.active = false;
        assert!(!record.is_within_window(now));
    }
}
