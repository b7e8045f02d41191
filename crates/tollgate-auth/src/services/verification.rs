//! Verification code engine.
//!
//! A code moves `Pending -> Used` or `Pending -> Expired`. Expiry is noticed
//! lazily when a code is presented; nothing sweeps in the background.
//!
//! Issuing runs three explicit stages: generate the plain code, store its
//! digest, and hand the plain code to the mailer on a detached task. Marking a
//! code used runs none of them.

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::clock::SharedClock;
use crate::config::VerificationConfig;
use crate::error::AuthError;
use crate::notify::{VerificationMailer, VerificationMessage};
use crate::storage::{SubjectDirectory, VerificationCodeStorage};
use crate::types::{IssuedCode, SubjectContact, SubjectKind, SubjectRef, VerificationCode};

/// Number of digits in a code.
pub const CODE_LENGTH: usize = 6;

const CODE_SPACE: u32 = 1_000_000;

/// Produces plain verification codes.
pub trait CodeGenerator: Send + Sync + fmt::Debug {
    fn generate(&self) -> String;
}

/// Uniform random code in `[0, 1_000_000)`, zero-padded to six digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let n = rand::thread_rng().gen_range(0..CODE_SPACE);
        format!("{n:0width$}", width = CODE_LENGTH)
    }
}

/// Always returns the same code.
#[derive(Debug, Clone)]
pub struct FixedCodeGenerator(pub String);

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

/// Computes the stored digest of a plain code.
#[derive(Clone)]
pub struct CodeDigester {
    key: Option<Vec<u8>>,
}

impl fmt::Debug for CodeDigester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeDigester")
            .field("keyed", &self.key.is_some())
            .finish()
    }
}

impl CodeDigester {
    /// HMAC-SHA256 with `key`, or plain SHA-256 when `key` is empty.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: (!key.is_empty()).then(|| key.as_bytes().to_vec()),
        }
    }

    /// Lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the HMAC key is rejected.
    pub fn digest(&self, plain: &str) -> AuthResult<String> {
        match &self.key {
            Some(key) => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|e| AuthError::configuration(format!("invalid HMAC key: {e}")))?;
                mac.update(plain.as_bytes());
                Ok(hex::encode(mac.finalize().into_bytes()))
            }
            None => Ok(hex::encode(Sha256::digest(plain.as_bytes()))),
        }
    }
}

/// A generated code not yet stored.
pub(crate) struct PendingCode {
    plain: String,
    pub code_hash: String,
    pub expires_at: OffsetDateTime,
}

/// Issues, validates and consumes verification codes.
pub struct VerificationService {
    codes: Arc<dyn VerificationCodeStorage>,
    directory: Arc<dyn SubjectDirectory>,
    mailer: Arc<dyn VerificationMailer>,
    generator: Arc<dyn CodeGenerator>,
    digester: CodeDigester,
    clock: SharedClock,
    lifetime: Duration,
}

impl fmt::Debug for VerificationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationService")
            .field("generator", &self.generator)
            .field("digester", &self.digester)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl VerificationService {
    #[must_use]
    pub fn new(
        codes: Arc<dyn VerificationCodeStorage>,
        directory: Arc<dyn SubjectDirectory>,
        mailer: Arc<dyn VerificationMailer>,
        clock: SharedClock,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            codes,
            directory,
            mailer,
            generator: Arc::new(RandomCodeGenerator),
            digester: CodeDigester::new(&config.hmac_key),
            clock,
            lifetime: Duration::try_from(config.code_lifetime).unwrap_or(Duration::HOUR),
        }
    }

    /// Replaces the code generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn digester(&self) -> &CodeDigester {
        &self.digester
    }

    /// Issues a code for `subject` and emails it.
    ///
    /// Any previous code for the subject is overwritten.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` if the subject does not exist, or a storage error.
    #[tracing::instrument(skip(self, subject), fields(subject = %subject))]
    pub async fn issue(&self, subject: SubjectRef) -> AuthResult<IssuedCode> {
        let contact = self.directory.resolve(subject).await?;
        self.issue_to(contact).await
    }

    /// Issues a code for an already-resolved subject.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the code cannot be stored.
    pub async fn issue_to(&self, contact: SubjectContact) -> AuthResult<IssuedCode> {
        let pending = self.prepare()?;
        let record = self
            .codes
            .upsert_code(contact.subject, &pending.code_hash, pending.expires_at)
            .await?;
        Ok(self.deliver(&contact, pending, record))
    }

    /// Generates a plain code with its digest and expiry, storing nothing.
    pub(crate) fn prepare(&self) -> AuthResult<PendingCode> {
        let plain = self.generator.generate();
        let code_hash = self.digester.digest(&plain)?;
        Ok(PendingCode {
            plain,
            code_hash,
            expires_at: self.clock.now() + self.lifetime,
        })
    }

    /// Emails a code whose digest is already stored as `record`.
    pub(crate) fn deliver(
        &self,
        contact: &SubjectContact,
        pending: PendingCode,
        record: VerificationCode,
    ) -> IssuedCode {
        tracing::debug!(subject = %contact.subject, expires_at = %record.expires_at, "Verification code stored");
        let issued = IssuedCode {
            record,
            plain: pending.plain,
        };
        self.dispatch_email(contact, &issued);
        issued
    }

    /// Finds the subject's code matching `plain`.
    ///
    /// Expired or used codes are returned as-is; check them with
    /// [`VerificationCode::ensure_usable`] or call [`Self::verify`].
    ///
    /// # Errors
    ///
    /// `AuthError::NotCode` if the code does not match, whatever its state.
    pub async fn validate(&self, subject: SubjectRef, plain: &str) -> AuthResult<VerificationCode> {
        let code_hash = self.digester.digest(plain)?;
        self.codes.find_code(subject, &code_hash).await
    }

    /// [`Self::validate`] followed by the used and expired checks.
    ///
    /// # Errors
    ///
    /// `AuthError::NotCode`, `AuthError::AlreadyUsed` or `AuthError::Expired`.
    #[tracing::instrument(skip(self, subject, plain), fields(subject = %subject))]
    pub async fn verify(&self, subject: SubjectRef, plain: &str) -> AuthResult<VerificationCode> {
        let code = self.validate(subject, plain).await?;
        code.ensure_usable(self.clock.now())?;
        Ok(code)
    }

    /// Sets `used_at` without regenerating or emailing anything.
    ///
    /// # Errors
    ///
    /// `AuthError::AlreadyUsed` if the code was consumed already.
    pub async fn mark_used(&self, code: &VerificationCode) -> AuthResult<()> {
        self.codes.mark_used(code.id, self.clock.now()).await?;
        tracing::debug!(subject = %code.subject, "Verification code marked used");
        Ok(())
    }

    /// Regenerates the subject's code and emails it again.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` if the subject does not exist.
    pub async fn reissue(&self, kind: SubjectKind, subject_id: uuid::Uuid) -> AuthResult<IssuedCode> {
        self.issue(SubjectRef::new(kind, subject_id)).await
    }

    /// Regenerates the code for the subject of `kind` named `username`.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` if no such subject exists.
    pub async fn reissue_for_username(
        &self,
        kind: SubjectKind,
        username: &str,
    ) -> AuthResult<IssuedCode> {
        let subject = self.directory.find_by_username(kind, username).await?;
        self.issue(subject).await
    }

    fn dispatch_email(&self, contact: &SubjectContact, issued: &IssuedCode) {
        let message = VerificationMessage {
            to: contact.email.clone(),
            username: contact.username.clone(),
            kind: contact.subject.kind,
            code: issued.plain.clone(),
            expires_at: issued.record.expires_at,
        };
        let mailer = Arc::clone(&self.mailer);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(to = %message.to, "No async runtime, verification email not sent");
            return;
        };
        handle.spawn(async move {
            if let Err(e) = mailer.send_verification(&message).await {
                tracing::warn!(to = %message.to, error = %e, "Failed to send verification email");
            }
        });
    }
}
