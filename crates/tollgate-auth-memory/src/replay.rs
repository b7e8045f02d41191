use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tollgate_auth::storage::{JtiStorage, NonceStorage};
use tollgate_auth::types::{AssertionRecord, Nonce, ReplayStatus};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::storage::InMemoryAuthStorage;

#[async_trait]
impl NonceStorage for InMemoryAuthStorage {
    async fn issue_nonce(&self, bound_token: &str, ttl: Duration) -> AuthResult<String> {
        let nonce = Nonce {
            value: Uuid::new_v4().to_string(),
            bound_token: bound_token.to_string(),
            expires_at: self.now() + ttl,
        };
        let value = nonce.value.clone();
        self.state
            .write()
            .await
            .nonces
            .insert((nonce.bound_token.clone(), nonce.value.clone()), nonce);
        Ok(value)
    }

    async fn consume_nonce(&self, bound_token: &str, nonce: &str) -> AuthResult<()> {
        let now = self.now();
        let removed = self
            .state
            .write()
            .await
            .nonces
            .remove(&(bound_token.to_string(), nonce.to_string()));
        match removed {
            None => Err(AuthError::not_found("nonce")),
            Some(n) if n.is_expired(now) => Err(AuthError::expired("nonce")),
            Some(_) => Ok(()),
        }
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let now = self.now();
        let mut state = self.state.write().await;
        let before = state.nonces.len();
        state.nonces.retain(|_, n| !n.is_expired(now));
        Ok((before - state.nonces.len()) as u64)
    }
}

#[async_trait]
impl JtiStorage for InMemoryAuthStorage {
    async fn check_assertion(&self, jti: &str) -> AuthResult<ReplayStatus> {
        let now = self.now();
        let state = self.state.read().await;
        Ok(match state.assertions.get(jti) {
            Some(record) if record.is_within_window(now) => ReplayStatus::Known,
            _ => ReplayStatus::Free,
        })
    }

    async fn record_assertion(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        let now = self.now();
        let mut state = self.state.write().await;
        if state
            .assertions
            .get(jti)
            .is_some_and(|record| record.is_within_window(now))
        {
            return Err(AuthError::replay_detected(format!("jti {jti}")));
        }
        state.assertions.insert(
            jti.to_string(),
            AssertionRecord {
                jti: jti.to_string(),
                expires_at,
                active: true,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let now = self.now();
        let mut state = self.state.write().await;
        let before = state.assertions.len();
        state.assertions.retain(|_, r| r.expires_at > now);
        Ok((before - state.assertions.len()) as u64)
    }
}
