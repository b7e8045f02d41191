//! Account, role and subject storage.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{
    Image, PromotionOutcome, PromotionPlan, Role, Scope, SubjectContact, SubjectKind, SubjectRef,
    TemporaryAccount, User, VerificationCode,
};

/// Resolves a polymorphic subject reference to its record.
///
/// Implementations dispatch on [`SubjectKind`] to the matching table.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the subject does not exist.
    async fn resolve(&self, subject: SubjectRef) -> AuthResult<SubjectContact>;

    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no subject of `kind` has this username.
    async fn find_by_username(&self, kind: SubjectKind, username: &str) -> AuthResult<SubjectRef>;
}

/// Temporary and permanent accounts.
#[async_trait]
pub trait AccountStorage: SubjectDirectory {
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the username is taken for this kind.
    async fn create_temporary(&self, account: &TemporaryAccount) -> AuthResult<()>;

    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the record does not exist.
    async fn find_temporary(&self, kind: SubjectKind, id: Uuid) -> AuthResult<TemporaryAccount>;

    /// Stores a registration and its verification code in one transaction.
    ///
    /// With `refresh` the existing record's email, password hash, subject
    /// name and `updated_at` are overwritten, otherwise it is created as by
    /// [`Self::create_temporary`]. The code is upserted as by
    /// `VerificationCodeStorage::upsert_code`. On any error nothing is written.
    ///
    /// # Errors
    ///
    /// - `AuthError::Conflict` if a permanent account owns the username or
    ///   email, or a new record collides with a pending one.
    /// - `AuthError::NotFound` if a refreshed record no longer exists.
    async fn save_registration(
        &self,
        account: &TemporaryAccount,
        refresh: bool,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode>;

    async fn find_temporary_by_username(
        &self,
        kind: SubjectKind,
        username: &str,
    ) -> AuthResult<Option<TemporaryAccount>>;

    /// Returns `true` if a permanent user (or waiting teacher) owns the
    /// username or the email.
    async fn is_taken(&self, username: &str, email: &str) -> AuthResult<bool>;

    async fn find_user_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Creates a permanent user with its image. Used by bootstrap seeding.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the username or email is taken.
    async fn create_user(&self, user: &User, image: &Image) -> AuthResult<()>;

    /// Promotes a temporary account in one transaction.
    ///
    /// In order: mark the plan's code used, look up or create the role,
    /// create the permanent record (and image), link the role's default
    /// scopes, delete the temporary record and its codes.
    ///
    /// # Errors
    ///
    /// - `AuthError::AlreadyUsed` if the code was consumed concurrently.
    /// - `AuthError::Conflict` if the username or email became taken.
    /// - `AuthError::Destroy` if everything but the final delete succeeded.
    ///   The permanent record is committed in that case.
    ///
    /// Any other failure rolls the whole transaction back.
    async fn promote(&self, plan: &PromotionPlan) -> AuthResult<PromotionOutcome>;
}

/// Roles and scopes.
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Returns the role named `role.name`, creating it from `role` if absent.
    async fn find_or_create_role(&self, role: &Role) -> AuthResult<Role>;

    async fn find_role(&self, name: &str) -> AuthResult<Option<Role>>;

    /// Creates a scope if absent. Returns `true` when it was created.
    async fn upsert_scope(&self, scope: &Scope) -> AuthResult<bool>;

    /// Links existing scopes to a role. Unknown scope names are skipped.
    async fn link_scopes(&self, role_id: Uuid, scopes: &[String]) -> AuthResult<()>;
}
