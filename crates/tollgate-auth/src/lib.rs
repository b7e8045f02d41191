//! # tollgate-auth
//!
//! Persistence contracts and lifecycle rules for the short-lived artifacts
//! of an OAuth 2.0 / OpenID Connect authorization server, plus the email
//! verification workflow that turns temporary sign-ups into accounts.
//!
//! The grant-type state machines, token signing and HTTP transport live
//! outside this crate and call in through the storage traits.
//!
//! ## Modules
//!
//! - [`storage`] - Storage traits implemented by the backend crates
//! - [`types`] - Artifacts, sessions, clients, keys and accounts
//! - [`claims`] - ID token claim and header projection
//! - [`services`] - Verification codes, promotion, registration, replay guard
//! - [`config`] - Configuration
//! - [`error`] - The [`AuthError`] taxonomy

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod secret;
pub mod services;
pub mod storage;
pub mod types;
pub mod validation;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use notify::{DisabledMailer, VerificationMailer, VerificationMessage};
pub use storage::{
    AccountStorage, ArtifactStorage, ClientKeyStorage, ClientStorage, JtiStorage, NonceStorage,
    RoleStorage, SubjectDirectory, VerificationCodeStorage,
};
pub use types::{
    Artifact, ArtifactKind, ArtifactLookup, Client, Session, StoredArtifact, SubjectKind,
    SubjectRef,
};

/// Type alias for results in this crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::clock::{Clock, SharedClock};
    pub use crate::error::AuthError;
    pub use crate::storage::*;
    pub use crate::types::*;
}
