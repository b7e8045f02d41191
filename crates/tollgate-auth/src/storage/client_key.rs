//! Client key registry for RFC 7523 assertion authentication.

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};

use crate::AuthResult;
use crate::types::ClientKey;

/// Lookup of JWKs by `(issuer, subject, key_id)`.
#[async_trait]
pub trait ClientKeyStorage: Send + Sync {
    /// Registers a key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if `(issuer, subject, key_id)` is taken.
    async fn add_key(&self, key: &ClientKey) -> AuthResult<()>;

    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no such key exists.
    async fn get_key(&self, issuer: &str, subject: &str, key_id: &str) -> AuthResult<Jwk>;

    /// All keys for the pair. An empty set is not an error.
    async fn get_key_set(&self, issuer: &str, subject: &str) -> AuthResult<JwkSet>;

    /// Scopes permitted for assertions signed with the key.
    ///
    /// An unknown key yields an empty list: no additional grant.
    async fn get_key_scopes(
        &self,
        issuer: &str,
        subject: &str,
        key_id: &str,
    ) -> AuthResult<Vec<String>>;
}
