//! Temporary account registration.
//!
//! Stages, in order: validate fields, check the username and email against
//! permanent accounts, hash the password, store (or refresh) the temporary
//! record together with a new verification code, email the code.
//!
//! The record and its code are written in one backend transaction, so a
//! failed code write never leaves a pending account without a code.

use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::clock::SharedClock;
use crate::error::AuthError;
use crate::secret;
use crate::services::VerificationService;
use crate::storage::AccountStorage;
use crate::types::{IssuedCode, SubjectKind, TemporaryAccount};
use crate::validation::{self, ValidationErrors};

/// A sign-up request.
#[derive(Clone)]
pub struct RegistrationRequest {
    pub kind: SubjectKind,
    pub username: String,
    pub email: String,
    pub password: String,
    /// Teaching subject, teachers only.
    pub subject_name: Option<String>,
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("subject_name", &self.subject_name)
            .finish()
    }
}

impl RegistrationRequest {
    /// Field validation.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidInput` listing every offending field.
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = ValidationErrors::new();
        if !self.kind.is_temporary() {
            errors.push("subject_type", "must be a temporary account type");
        }
        errors.check("username", validation::validate_username(&self.username));
        errors.check("email", validation::validate_email(&self.email));
        errors.check("password", validation::validate_password(&self.password));
        if self.kind == SubjectKind::TeacherTemp
            && self.subject_name.as_deref().is_none_or(|s| s.trim().is_empty())
        {
            errors.push("subject_name", "is required for teachers");
        }
        errors.into_result()
    }
}

/// A stored registration with its freshly issued code.
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: TemporaryAccount,
    pub code: IssuedCode,
    /// An earlier pending registration with this username was refreshed.
    pub refreshed: bool,
}

pub struct RegistrationService {
    accounts: Arc<dyn AccountStorage>,
    verification: Arc<VerificationService>,
    clock: SharedClock,
}

impl RegistrationService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        verification: Arc<VerificationService>,
        clock: SharedClock,
    ) -> Self {
        Self {
            accounts,
            verification,
            clock,
        }
    }

    /// Registers a temporary account and emails its verification code.
    ///
    /// Registering again under a username that is still pending refreshes
    /// that record and replaces its code.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidInput` for bad fields.
    /// - `AuthError::Conflict` if a permanent account owns the username or
    ///   email, including one created concurrently.
    #[tracing::instrument(skip_all, fields(kind = %request.kind, username = %request.username))]
    pub async fn register(&self, request: RegistrationRequest) -> AuthResult<Registration> {
        request.validate()?;

        if self.accounts.is_taken(&request.username, &request.email).await? {
            return Err(AuthError::conflict(format!(
                "username or email already registered: {}",
                request.username
            )));
        }

        let password_hash = secret::hash_secret(&request.password)?;
        let now = self.clock.now();

        let existing = self
            .accounts
            .find_temporary_by_username(request.kind, &request.username)
            .await?;
        let refreshed = existing.is_some();

        let account = match existing {
            Some(mut account) => {
                account.email = request.email;
                account.password_hash = password_hash;
                account.subject_name = request.subject_name;
                account.updated_at = now;
                account
            }
            None => TemporaryAccount {
                id: Uuid::new_v4(),
                kind: request.kind,
                username: request.username,
                email: request.email,
                password_hash,
                subject_name: request.subject_name,
                created_at: now,
                updated_at: now,
            },
        };

        let pending = self.verification.prepare()?;
        let record = self
            .accounts
            .save_registration(&account, refreshed, &pending.code_hash, pending.expires_at)
            .await?;
        let code = self.verification.deliver(&account.contact(), pending, record);
        tracing::info!(account_id = %account.id, refreshed, "Temporary account registered");

        Ok(Registration {
            account,
            code,
            refreshed,
        })
    }
}
