//! Artifact storage trait.
//!
//! One contract serves every [`ArtifactKind`]: the protocol engine creates an
//! artifact together with its session, looks it up by key, invalidates it on
//! use or revocation, and finally deletes it.
//!
//! # Invalidate vs. delete
//!
//! `invalidate` flips the active flag and keeps the row, so a later lookup
//! can still report reuse. `delete` removes the row and its session for good.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Artifact, ArtifactKind, ArtifactLookup, Session};

/// Storage trait for protocol artifacts.
///
/// # Implementations
///
/// - `tollgate-auth-postgres` - PostgreSQL storage backend
/// - `tollgate-auth-memory` - in-memory backend
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persists `session` (if any) and then `artifact`, atomically.
    ///
    /// The artifact's `session_id` is set from `session`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the artifact key already exists for
    /// this kind, including soft-deleted rows.
    async fn create(&self, artifact: &Artifact, session: Option<&Session>) -> AuthResult<()>;

    /// Looks up an artifact with its client, session and the session's user.
    ///
    /// Inactive records are returned as [`ArtifactLookup::Invalidated`].
    ///
    /// # Errors
    ///
    /// - `AuthError::NotFound` if absent or soft-deleted.
    /// - `AuthError::Expired` for a pushed request past its expiry.
    async fn find_by_key(&self, kind: ArtifactKind, key: &str) -> AuthResult<ArtifactLookup>;

    /// Sets `active = false`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the key never existed.
    async fn invalidate(&self, kind: ArtifactKind, key: &str) -> AuthResult<()>;

    /// Hard-deletes the artifact. Its session goes too once no other live
    /// artifact references it. Deleting an absent key is a no-op.
    async fn delete(&self, kind: ArtifactKind, key: &str) -> AuthResult<()>;

    /// Invalidates every artifact of `kind` issued under `request_id`.
    ///
    /// Returns the number of records invalidated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if none exist.
    async fn revoke_by_request_id(&self, kind: ArtifactKind, request_id: &str) -> AuthResult<u64>;
}
