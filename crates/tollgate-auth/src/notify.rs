//! Outgoing verification email seam.
//!
//! Delivery is best-effort: the services dispatch on a background task and
//! only log failures.

use std::fmt;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::SubjectKind;

/// Content of a verification email.
#[derive(Clone)]
pub struct VerificationMessage {
    pub to: String,
    pub username: String,
    pub kind: SubjectKind,
    /// Plain code. Never persisted.
    pub code: String,
    pub expires_at: OffsetDateTime,
}

impl fmt::Debug for VerificationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationMessage")
            .field("to", &self.to)
            .field("username", &self.username)
            .field("kind", &self.kind)
            .field("code", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Sends verification emails.
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(&self, message: &VerificationMessage) -> AuthResult<()>;
}

/// Mailer used when mail is disabled: logs the recipient and drops the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl VerificationMailer for DisabledMailer {
    async fn send_verification(&self, message: &VerificationMessage) -> AuthResult<()> {
        tracing::info!(
            to = %message.to,
            kind = %message.kind,
            "Mail disabled, verification email not sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn message() -> VerificationMessage {
        VerificationMessage {
            to: "alice@school.test".to_string(),
            username: "alice".to_string(),
            kind: SubjectKind::StudentTemp,
            code: "042613".to_string(),
            expires_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_debug_redacts_code() {
        let debug = format!("{:?}", message());
        assert!(debug.contains("alice@school.test"));
        assert!(!debug.contains("042613"));
    }

    #[test]
    fn test_disabled_mailer_accepts_everything() {
        assert!(block_on(DisabledMailer.send_verification(&message())).is_ok());
    }
}
