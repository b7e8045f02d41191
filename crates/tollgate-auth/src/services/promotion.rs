//! Account promotion workflow.
//!
//! Once a verification code checks out, the temporary account is promoted in
//! one backend transaction: the code is consumed, the role is looked up or
//! created, the permanent record and its default image are written, and the
//! temporary record is deleted.

use std::sync::Arc;

use uuid::Uuid;

use crate::AuthResult;
use crate::clock::SharedClock;
use crate::config::AccountsConfig;
use crate::error::AuthError;
use crate::services::VerificationService;
use crate::storage::AccountStorage;
use crate::types::{
    ImageSpec, PlannedTarget, PromotionOutcome, PromotionPlan, PromotionTarget, Role, SubjectKind,
    SubjectRef, TemporaryAccount, VerificationCode,
};
use crate::validation;

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccount {
    /// The permanent record now backing the subject.
    pub account_id: Uuid,
    /// What promotion produced; `None` for re-verification of a permanent user.
    pub outcome: Option<PromotionOutcome>,
    /// The temporary record could not be removed and awaits cleanup.
    pub cleanup_pending: bool,
}

/// Promotes verified temporary accounts.
pub struct PromotionService {
    accounts: Arc<dyn AccountStorage>,
    verification: Arc<VerificationService>,
    config: AccountsConfig,
    clock: SharedClock,
}

impl PromotionService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        verification: Arc<VerificationService>,
        config: AccountsConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            accounts,
            verification,
            config,
            clock,
        }
    }

    /// Builds the promotion plan for `temporary`, consuming `code`.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidInput` if the account kind cannot be promoted or
    /// maps to a role outside the allowed set.
    pub fn plan(&self, temporary: TemporaryAccount, code: &VerificationCode) -> AuthResult<PromotionPlan> {
        let target = match temporary.kind.promotion_target() {
            PromotionTarget::User { role } => {
                validation::validate_role_name(role)
                    .map_err(|e| AuthError::invalid_field("role", e))?;
                PlannedTarget::User {
                    role: Role::new(role)
                        .with_description(role_description(role))
                        .with_scopes(self.config.scopes_for_role(role)),
                    image: ImageSpec {
                        file_name: self.config.default_image.clone(),
                        url: self.config.default_image_url(),
                    },
                }
            }
            PromotionTarget::TeacherWaiting => PlannedTarget::TeacherWaiting,
            PromotionTarget::None => {
                return Err(AuthError::invalid_field(
                    "subject_type",
                    format!("{} is not a temporary account", temporary.kind),
                ));
            }
        };

        Ok(PromotionPlan {
            temporary,
            code_id: code.id,
            target,
            promoted_at: self.clock.now(),
        })
    }

    /// Promotes `temporary` using the already verified `code`.
    ///
    /// # Errors
    ///
    /// `AuthError::Destroy` when the account was created but the temporary
    /// record remains; any other error means nothing changed.
    #[tracing::instrument(skip_all, fields(kind = %temporary.kind, username = %temporary.username))]
    pub async fn promote(
        &self,
        temporary: TemporaryAccount,
        code: &VerificationCode,
    ) -> AuthResult<PromotionOutcome> {
        let plan = self.plan(temporary, code)?;
        let outcome = self.accounts.promote(&plan).await?;
        tracing::info!(account_id = %outcome.account_id(), "Temporary account promoted");
        Ok(outcome)
    }

    /// Verifies `plain` for the subject and promotes it.
    ///
    /// A permanent user re-verifying only has the code consumed. A cleanup
    /// failure after promotion is reported through
    /// [`VerifiedAccount::cleanup_pending`], not as an error.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotCode` for a wrong code.
    /// - `AuthError::Expired` or `AuthError::AlreadyUsed` for a late one.
    /// - `AuthError::NotFound` if the subject vanished.
    pub async fn verify_and_promote(
        &self,
        kind: SubjectKind,
        subject_id: Uuid,
        plain: &str,
    ) -> AuthResult<VerifiedAccount> {
        let subject = SubjectRef::new(kind, subject_id);
        let code = self.verification.verify(subject, plain).await?;

        if !kind.is_temporary() {
            self.verification.mark_used(&code).await?;
            return Ok(VerifiedAccount {
                account_id: subject_id,
                outcome: None,
                cleanup_pending: false,
            });
        }

        let temporary = self.accounts.find_temporary(kind, subject_id).await?;
        match self.promote(temporary, &code).await {
            Ok(outcome) => Ok(VerifiedAccount {
                account_id: outcome.account_id(),
                outcome: Some(outcome),
                cleanup_pending: false,
            }),
            Err(AuthError::Destroy {
                account_id,
                temporary_id,
                message,
            }) => {
                tracing::warn!(
                    %account_id,
                    %temporary_id,
                    error = %message,
                    "Account promoted but temporary record was not removed"
                );
                Ok(VerifiedAccount {
                    account_id,
                    outcome: None,
                    cleanup_pending: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn role_description(role: &str) -> String {
    match role {
        "student" => "Student account with access to enrolled courses".to_string(),
        "admin" => "Administrator with full access".to_string(),
        other => format!("{other} role"),
    }
}
