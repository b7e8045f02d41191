//! Verification code storage.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{SubjectRef, VerificationCode};

/// Storage for hashed verification codes, one per subject.
#[async_trait]
pub trait VerificationCodeStorage: Send + Sync {
    /// Creates the subject's code, or overwrites the existing one.
    ///
    /// Overwriting replaces the digest and expiry and clears `used_at`.
    async fn upsert_code(
        &self,
        subject: SubjectRef,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode>;

    /// Finds the subject's code matching `code_hash`.
    ///
    /// Expired and used codes are returned; the caller decides.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotCode` if nothing matches.
    async fn find_code(&self, subject: SubjectRef, code_hash: &str) -> AuthResult<VerificationCode>;

    /// Sets `used_at`. Touches nothing else.
    ///
    /// # Errors
    ///
    /// - `AuthError::AlreadyUsed` if `used_at` was already set.
    /// - `AuthError::NotFound` if the code does not exist.
    async fn mark_used(&self, code_id: Uuid, used_at: OffsetDateTime) -> AuthResult<()>;
}
