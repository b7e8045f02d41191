//! Replay guard storage: one-time nonces and client-assertion JTIs.
//!
//! # Security Considerations
//!
//! - Both caches hard-delete; a consumed value is never retained.
//! - Consuming a nonce and recording a JTI must be linearizable per key:
//!   two concurrent callers presenting the same value cannot both succeed.
//! - Expired entries are reclaimed with `purge_expired`.

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::types::ReplayStatus;

/// Single-use nonces bound to a delivered access token.
#[async_trait]
pub trait NonceStorage: Send + Sync {
    /// Generates, stores and returns a fresh nonce valid for `ttl`.
    async fn issue_nonce(&self, bound_token: &str, ttl: Duration) -> AuthResult<String>;

    /// Consumes a nonce exactly once.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotFound` if no row matches (including a second consumption).
    /// - `AuthError::Expired` if the row was past expiry; the row is deleted anyway.
    ///
    /// # Atomicity
    ///
    /// The lookup and delete run in one transaction, for example:
    ///
    /// ```sql
    /// DELETE FROM nonces WHERE bound_token = $1 AND value = $2
    /// RETURNING expires_at
    /// ```
    async fn consume_nonce(&self, bound_token: &str, nonce: &str) -> AuthResult<()>;

    /// Deletes expired nonces and returns how many were removed.
    async fn purge_expired(&self) -> AuthResult<u64>;
}

/// JWT ID cache for client assertions (RFC 7523).
#[async_trait]
pub trait JtiStorage: Send + Sync {
    /// `Known` if the JTI is active and unexpired, `Free` otherwise.
    async fn check_assertion(&self, jti: &str) -> AuthResult<ReplayStatus>;

    /// Records a JTI as used until `expires_at`.
    ///
    /// An expired or inactive entry for the same JTI is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ReplayDetected` if an entry is still inside its
    /// window. The check and the write are one atomic step.
    async fn record_assertion(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Deletes expired entries and returns how many were removed.
    async fn purge_expired(&self) -> AuthResult<u64>;
}
