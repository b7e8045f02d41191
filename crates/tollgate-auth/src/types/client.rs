//! OAuth 2.0 client registrations.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::jwk::Jwk;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::secret;
use crate::validation::{self, ValidationErrors};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types a client may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
    Implicit,
    /// RFC 7523 JWT bearer assertion grant.
    #[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
    JwtBearer,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
            Self::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Token Endpoint Auth Method
// =============================================================================

/// How a client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    #[default]
    ClientSecretBasic,
    ClientSecretPost,
    PrivateKeyJwt,
    None,
}

impl TokenEndpointAuthMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::None => "none",
        }
    }

    /// Returns `true` for the methods that present a shared secret.
    #[must_use]
    pub fn uses_secret(&self) -> bool {
        matches!(self, Self::ClientSecretBasic | Self::ClientSecretPost)
    }
}

impl FromStr for TokenEndpointAuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_secret_basic" => Ok(Self::ClientSecretBasic),
            "client_secret_post" => Ok(Self::ClientSecretPost),
            "private_key_jwt" => Ok(Self::PrivateKeyJwt),
            "none" => Ok(Self::None),
            other => Err(format!("unsupported token endpoint auth method: {other}")),
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered relying party.
///
/// `secret` and `rotated_secrets` hold Argon2 hashes once the client has
/// passed through [`Client::prepare_for_save`]. A public client never
/// carries either.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    pub active: bool,

    /// Current secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Previous secrets still accepted during rotation, newest first.
    #[serde(default)]
    pub rotated_secrets: Vec<String>,

    /// Public clients cannot keep a secret.
    pub public: bool,

    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// Audience values for issued tokens. Empty means the client ID.
    #[serde(default)]
    pub audience: Vec<String>,

    #[serde(default)]
    pub grant_types: Vec<GrantType>,

    #[serde(default)]
    pub response_types: Vec<String>,

    #[serde(default)]
    pub response_modes: Vec<String>,

    #[serde(default)]
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Algorithm for signed ID tokens. `None` means RS256.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<String>,

    /// Keys registered for this client, in registration order.
    #[serde(default)]
    pub jwks: Vec<Jwk>,
}

impl Client {
    /// Creates an active confidential client with no secret and no grants.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            name: String::new(),
            active: true,
            secret: None,
            rotated_secrets: Vec::new(),
            public: false,
            redirect_uris: Vec::new(),
            scopes: Vec::new(),
            audience: Vec::new(),
            grant_types: Vec::new(),
            response_types: Vec::new(),
            response_modes: Vec::new(),
            token_endpoint_auth_method: TokenEndpointAuthMethod::default(),
            id_token_signed_response_alg: None,
            request_object_signing_alg: None,
            token_endpoint_auth_signing_alg: None,
            jwks: Vec::new(),
        }
    }

    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` listing every offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = ValidationErrors::new();

        if self.client_id.trim().is_empty() {
            errors.push("client_id", "must not be empty");
        }
        for uri in &self.redirect_uris {
            errors.check("redirect_uris", validation::validate_url(uri));
        }
        if !self.public
            && self.token_endpoint_auth_method.uses_secret()
            && self.secret.as_deref().is_none_or(str::is_empty)
        {
            errors.push(
                "secret",
                format!(
                    "required for confidential clients using {}",
                    self.token_endpoint_auth_method
                ),
            );
        }
        if self.public && self.grant_types.contains(&GrantType::ClientCredentials) {
            errors.push("grant_types", "public clients cannot use client_credentials");
        }

        errors.into_result()
    }

    /// Clears secrets on public clients.
    pub fn normalize(&mut self) {
        if self.public {
            self.secret = None;
            self.rotated_secrets.clear();
        }
    }

    /// Hashes the current and rotated secrets, leaving existing hashes untouched.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if hashing fails.
    pub fn hash_secrets(&mut self) -> Result<(), AuthError> {
        if let Some(current) = self.secret.as_deref() {
            self.secret = Some(secret::ensure_hashed(current)?);
        }
        self.rotated_secrets = self
            .rotated_secrets
            .iter()
            .map(|s| secret::ensure_hashed(s))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Runs the save pipeline: normalize, then hash secrets.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if hashing fails.
    pub fn prepare_for_save(&mut self) -> Result<(), AuthError> {
        self.normalize();
        self.hash_secrets()
    }

    /// Checks a presented secret against the current secret, then each rotated one.
    ///
    /// Always `false` for public clients and for the `none` auth method.
    #[must_use]
    pub fn verify_secret(&self, presented: &str) -> bool {
        if self.public || self.token_endpoint_auth_method == TokenEndpointAuthMethod::None {
            return false;
        }
        self.secret
            .iter()
            .chain(self.rotated_secrets.iter())
            .any(|hash| secret::verify_secret(presented, hash))
    }

    /// Replaces the current secret, keeping at most `keep` previous secrets.
    ///
    /// The new secret is stored in plain form until the next
    /// [`Client::prepare_for_save`].
    pub fn rotate_secret(&mut self, new_secret: impl Into<String>, keep: usize) {
        if let Some(previous) = self.secret.take() {
            self.rotated_secrets.insert(0, previous);
        }
        self.rotated_secrets.truncate(keep);
        self.secret = Some(new_secret.into());
    }

    /// Audience for issued tokens, falling back to the client ID.
    #[must_use]
    pub fn effective_audience(&self) -> Vec<String> {
        if self.audience.is_empty() {
            vec![self.client_id.clone()]
        } else {
            self.audience.clone()
        }
    }

    /// Key ID of the first registered key that carries one.
    #[must_use]
    pub fn first_key_id(&self) -> Option<&str> {
        self.jwks.iter().find_map(|k| k.common.key_id.as_deref())
    }

    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

// =============================================================================
// Tests
// =============================================================================
