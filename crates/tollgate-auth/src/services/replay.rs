//! Replay guard facade over the nonce and JTI caches.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::config::ReplayConfig;
use crate::storage::{JtiStorage, NonceStorage};
use crate::types::ReplayStatus;

/// Counts removed by [`ReplayGuard::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub nonces: u64,
    pub assertions: u64,
}

pub struct ReplayGuard {
    nonces: Arc<dyn NonceStorage>,
    assertions: Arc<dyn JtiStorage>,
    nonce_lifetime: Duration,
}

impl ReplayGuard {
    #[must_use]
    pub fn new(
        nonces: Arc<dyn NonceStorage>,
        assertions: Arc<dyn JtiStorage>,
        config: &ReplayConfig,
    ) -> Self {
        Self {
            nonces,
            assertions,
            nonce_lifetime: Duration::try_from(config.nonce_lifetime)
                .unwrap_or(Duration::minutes(5)),
        }
    }

    /// Issues a nonce bound to `bound_token` with the configured lifetime.
    pub async fn issue_nonce(&self, bound_token: &str) -> AuthResult<String> {
        self.nonces.issue_nonce(bound_token, self.nonce_lifetime).await
    }

    pub async fn issue_nonce_with_ttl(&self, bound_token: &str, ttl: Duration) -> AuthResult<String> {
        self.nonces.issue_nonce(bound_token, ttl).await
    }

    /// # Errors
    ///
    /// `AuthError::NotFound` or `AuthError::Expired`.
    pub async fn consume_nonce(&self, bound_token: &str, nonce: &str) -> AuthResult<()> {
        self.nonces.consume_nonce(bound_token, nonce).await
    }

    pub async fn check_assertion(&self, jti: &str) -> AuthResult<ReplayStatus> {
        self.assertions.check_assertion(jti).await
    }

    /// # Errors
    ///
    /// `AuthError::ReplayDetected` if the JTI is still inside its window.
    pub async fn record_assertion(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.assertions.record_assertion(jti, expires_at).await
    }

    /// Hard-deletes expired entries from both caches.
    pub async fn purge_expired(&self) -> AuthResult<PurgeReport> {
        let report = PurgeReport {
            nonces: self.nonces.purge_expired().await?,
            assertions: self.assertions.purge_expired().await?,
        };
        tracing::info!(
            nonces = report.nonces,
            assertions = report.assertions,
            "Purged expired replay entries"
        );
        Ok(report)
    }
}
