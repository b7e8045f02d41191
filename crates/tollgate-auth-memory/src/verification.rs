use async_trait::async_trait;
use time::OffsetDateTime;
use tollgate_auth::storage::VerificationCodeStorage;
use tollgate_auth::types::{SubjectRef, VerificationCode};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::storage::InMemoryAuthStorage;

#[async_trait]
impl VerificationCodeStorage for InMemoryAuthStorage {
    async fn upsert_code(
        &self,
        subject: SubjectRef,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode> {
        if self.fail_points.code_upsert_fails() {
            return Err(AuthError::storage("verification code upsert failed"));
        }
        let now = self.now();
        Ok(self
            .state
            .write()
            .await
            .upsert_code(subject, code_hash, expires_at, now))
    }

    async fn find_code(&self, subject: SubjectRef, code_hash: &str) -> AuthResult<VerificationCode> {
        self.state
            .read()
            .await
            .codes
            .get(&subject)
            .filter(|code| code.code_hash == code_hash)
            .cloned()
            .ok_or(AuthError::NotCode)
    }

    async fn mark_used(&self, code_id: Uuid, used_at: OffsetDateTime) -> AuthResult<()> {
        let mut state = self.state.write().await;
        let code = state
            .codes
            .values_mut()
            .find(|code| code.id == code_id)
            .ok_or_else(|| AuthError::not_found("verification code"))?;
        if code.used_at.is_some() {
            return Err(AuthError::AlreadyUsed);
        }
        code.used_at = Some(used_at);
        Ok(())
    }
}
