//! Short-lived protocol artifacts: codes, tokens, PKCE and PAR records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::{Client, Session, User};

/// The artifact kinds the store persists.
///
/// Every kind shares the same record shape and lifecycle contract, and each
/// maps to its own table keyed by the unique lookup value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
    Pkce,
    PushedRequest,
    /// OpenID Connect session stored alongside an authorization code.
    OpenIdConnect,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        Self::AuthorizationCode,
        Self::AccessToken,
        Self::RefreshToken,
        Self::Pkce,
        Self::PushedRequest,
        Self::OpenIdConnect,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::Pkce => "pkce",
            Self::PushedRequest => "pushed_request",
            Self::OpenIdConnect => "openid_connect",
        }
    }

    /// Backing table name.
    #[must_use]
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_codes",
            Self::AccessToken => "access_tokens",
            Self::RefreshToken => "refresh_tokens",
            Self::Pkce => "pkce_requests",
            Self::PushedRequest => "pushed_requests",
            Self::OpenIdConnect => "openid_connect_sessions",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PAR-only fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushedRequestDetails {
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(default)]
    pub used: bool,
}

/// A persisted artifact.
///
/// `request_id` is the protocol engine's request identifier; `key` is the
/// unique lookup value (code, token signature or request URI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub request_id: String,
    pub key: String,
    /// `None` reads as active.
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub requested_scopes: Vec<String>,
    #[serde(default)]
    pub granted_scopes: Vec<String>,
    #[serde(default)]
    pub requested_audience: Vec<String>,
    #[serde(default)]
    pub granted_audience: Vec<String>,
    /// The original request form, as submitted.
    #[serde(default)]
    pub form: BTreeMap<String, Vec<String>>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed: Option<PushedRequestDetails>,
}

impl Artifact {
    #[must_use]
    pub fn new(
        kind: ArtifactKind,
        request_id: impl Into<String>,
        key: impl Into<String>,
        requested_at: OffsetDateTime,
    ) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
            key: key.into(),
            active: None,
            requested_at,
            client_id: None,
            session_id: None,
            requested_scopes: Vec::new(),
            granted_scopes: Vec::new(),
            requested_audience: Vec::new(),
            granted_audience: Vec::new(),
            form: BTreeMap::new(),
            expires_at: None,
            pushed: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Returns `true` when `expires_at` is set and not after `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether a lookup should report this record as invalidated.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        !self.is_active() || self.pushed.as_ref().is_some_and(|p| p.used)
    }
}

/// An artifact with its client, session and the session's user loaded.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub artifact: Artifact,
    pub client: Option<Client>,
    pub session: Option<Session>,
    pub user: Option<User>,
}

/// Result of a key lookup.
///
/// An invalidated record is still returned so the protocol engine can react
/// to reuse (for example by revoking the whole token family).
#[derive(Debug, Clone)]
pub enum ArtifactLookup {
    Active(StoredArtifact),
    Invalidated(StoredArtifact),
}

impl ArtifactLookup {
    /// Tags `stored` according to its active flag.
    #[must_use]
    pub fn from_stored(stored: StoredArtifact) -> Self {
        if stored.artifact.is_invalidated() {
            Self::Invalidated(stored)
        } else {
            Self::Active(stored)
        }
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated(_))
    }

    #[must_use]
    pub fn record(&self) -> &StoredArtifact {
        match self {
            Self::Active(stored) | Self::Invalidated(stored) => stored,
        }
    }

    #[must_use]
    pub fn into_record(self) -> StoredArtifact {
        match self {
            Self::Active(stored) | Self::Invalidated(stored) => stored,
        }
    }

    /// Returns the record if active.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Invalidated` for an inactive record.
    pub fn into_active(self) -> Result<StoredArtifact, AuthError> {
        match self {
            Self::Active(stored) => Ok(stored),
            Self::Invalidated(stored) => Err(AuthError::invalidated(format!(
                "{} for request {}",
                stored.artifact.kind, stored.artifact.request_id
            ))),
        }
    }
}
