//! Per-grant session context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Token kinds a session tracks expiry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AuthorizeCode,
    AccessToken,
    RefreshToken,
    IdToken,
    PushedAuthorizeRequest,
}

/// Ephemeral context created once per grant request.
///
/// Read-mostly after creation, and removed together with the artifact
/// that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub subject: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(default)]
    pub amr: Vec<String>,
    /// Expiry per token kind; a session has no single expiry.
    #[serde(default)]
    pub expires_at: BTreeMap<TokenKind, i64>,
    /// Request-scoped data: requested audience, hash inputs, overrides.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Session {
    #[must_use]
    pub fn new(client_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            user_id: None,
            subject: subject.into(),
            username: String::new(),
            auth_time: None,
            nonce: None,
            acr: None,
            amr: Vec::new(),
            expires_at: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Sets the expiry for one token kind.
    pub fn set_expires_at(&mut self, kind: TokenKind, at: OffsetDateTime) {
        self.expires_at.insert(kind, at.unix_timestamp());
    }

    /// Expiry for one token kind, if set.
    #[must_use]
    pub fn expires_at(&self, kind: TokenKind) -> Option<OffsetDateTime> {
        self.expires_at
            .get(&kind)
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(*ts).ok())
    }

    /// String value from the extra-claims bag; non-string values are ignored.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}
