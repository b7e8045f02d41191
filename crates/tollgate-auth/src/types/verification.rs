//! One-time verification codes.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::SubjectRef;

/// A stored verification code. Only the digest is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub id: Uuid,
    pub subject: SubjectRef,
    /// Hex digest of the plain code.
    pub code_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub used_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl VerificationCode {
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// Both predicates in one call. Used wins over expired.
    ///
    /// # Errors
    ///
    /// `AuthError::AlreadyUsed` or `AuthError::Expired`.
    pub fn ensure_usable(&self, now: OffsetDateTime) -> Result<(), AuthError> {
        if self.is_used() {
            return Err(AuthError::AlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(AuthError::expired(format!(
                "verification code for {}",
                self.subject
            )));
        }
        Ok(())
    }
}

/// A freshly issued code together with its plain value.
///
/// The plain value exists only long enough to compose the outgoing email.
#[derive(Clone)]
pub struct IssuedCode {
    pub record: VerificationCode,
    pub plain: String,
}

impl fmt::Debug for IssuedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCode")
            .field("record", &self.record)
            .field("plain", &"[redacted]")
            .finish()
    }
}
