//! ID token claim and header projection from a stored session.
//!
//! Projection never fails: a missing or malformed value in the session's
//! extra bag falls back to its default.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::types::{Client, Session};

/// Authentication context class used when the session carries none.
pub const DEFAULT_ACR: &str = "urn:mace:incommon:iap:silver";

/// Authentication method used when the session carries none.
pub const DEFAULT_AMR: &str = "pwd";

/// Signing algorithm used when neither the session nor the client names one.
pub const DEFAULT_ALG: &str = "RS256";

/// Extra-bag keys consumed by projection rather than copied into claims.
pub mod extra_keys {
    pub const ALG: &str = "alg";
    pub const KID: &str = "kid";
    pub const CODE: &str = "code";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REQUESTED_AT: &str = "requested_at";

    pub(crate) const RESERVED: [&str; 5] = [ALG, KID, CODE, ACCESS_TOKEN, REQUESTED_AT];
}

/// Claims for an ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub aud: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    /// Requested-at, unix seconds.
    pub rat: i64,
    pub acr: String,
    pub amr: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// JOSE header for an ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeaders {
    pub alg: String,
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Left-half hash used for `at_hash` and `c_hash`.
///
/// The digest is picked from the numeric suffix of `alg` (384 or 512),
/// defaulting to SHA-256. The left half is base64url-encoded without padding.
#[must_use]
pub fn oidc_hash(value: &str, alg: &str) -> String {
    let digest: Vec<u8> = if alg.ends_with("512") {
        Sha512::digest(value.as_bytes()).to_vec()
    } else if alg.ends_with("384") {
        Sha384::digest(value.as_bytes()).to_vec()
    } else {
        Sha256::digest(value.as_bytes()).to_vec()
    };
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Signing algorithm: extra-bag override, then the client's setting, then RS256.
#[must_use]
pub fn resolve_alg(session: &Session, client: &Client) -> String {
    session
        .extra_str(extra_keys::ALG)
        .or(client.id_token_signed_response_alg.as_deref())
        .unwrap_or(DEFAULT_ALG)
        .to_string()
}

/// Builds ID token claims from `session` and its owning `client`.
#[must_use]
pub fn project_claims(session: &Session, client: &Client, now: OffsetDateTime) -> IdTokenClaims {
    let alg = resolve_alg(session, client);

    let requested_at = session
        .extra_str(extra_keys::REQUESTED_AT)
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
        .unwrap_or(now);

    let amr = if session.amr.is_empty() {
        vec![DEFAULT_AMR.to_string()]
    } else {
        session.amr.clone()
    };

    let extra = session
        .extra
        .iter()
        .filter(|(k, _)| !extra_keys::RESERVED.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    IdTokenClaims {
        sub: session.subject.clone(),
        aud: client.effective_audience(),
        nonce: session.nonce.clone().filter(|n| !n.is_empty()),
        auth_time: session.auth_time.map(OffsetDateTime::unix_timestamp),
        rat: requested_at.unix_timestamp(),
        acr: session
            .acr
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_ACR.to_string()),
        amr,
        at_hash: session
            .extra_str(extra_keys::ACCESS_TOKEN)
            .map(|token| oidc_hash(token, &alg)),
        c_hash: session
            .extra_str(extra_keys::CODE)
            .map(|code| oidc_hash(code, &alg)),
        extra,
    }
}

/// Builds the JOSE header: `alg`, `typ: "JWT"` and an optional `kid`.
///
/// The key ID comes from the client's first registered key, falling back to
/// an extra-bag override.
#[must_use]
pub fn project_headers(session: &Session, client: &Client) -> TokenHeaders {
    TokenHeaders {
        alg: resolve_alg(session, client),
        typ: "JWT".to_string(),
        kid: client
            .first_key_id()
            .or_else(|| session.extra_str(extra_keys::KID))
            .map(str::to_string),
    }
}
