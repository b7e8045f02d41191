//! Keys registered for assertion-based client authentication (RFC 7523).

use jsonwebtoken::jwk::Jwk;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A JWK registered under `(issuer, subject, key_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientKey {
    pub id: Uuid,
    pub client_id: String,
    pub issuer: String,
    pub subject: String,
    pub key_id: String,
    pub jwk: Jwk,
    /// Scopes an assertion signed with this key may be granted.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ClientKey {
    /// Creates a key record; `key_id` is taken from the JWK's `kid` when present.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        issuer: impl Into<String>,
        subject: impl Into<String>,
        key_id: impl Into<String>,
        jwk: Jwk,
    ) -> Self {
        let key_id = jwk.common.key_id.clone().unwrap_or_else(|| key_id.into());
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            issuer: issuer.into(),
            subject: subject.into(),
            key_id,
            jwk,
            scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}
