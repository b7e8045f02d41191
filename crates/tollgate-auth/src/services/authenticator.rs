//! Resource-owner password authentication for permanent users.

use std::sync::{Arc, LazyLock};

use crate::AuthResult;
use crate::error::AuthError;
use crate::secret;
use crate::storage::AccountStorage;
use crate::types::User;

/// Verified against when the username is unknown, so both failure paths
/// run one Argon2 verification.
static UNKNOWN_USER_HASH: LazyLock<String> =
    LazyLock::new(|| secret::hash_secret("unknown-user").unwrap_or_default());

pub struct UserAuthenticator {
    accounts: Arc<dyn AccountStorage>,
}

impl UserAuthenticator {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStorage>) -> Self {
        Self { accounts }
    }

    /// Checks a permanent user's password.
    ///
    /// Temporary accounts and teachers awaiting approval cannot sign in.
    ///
    /// # Errors
    ///
    /// - `AuthError::Unauthenticated` for an unknown username or a wrong password.
    /// - Storage errors from the lookup.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> AuthResult<User> {
        let user = self.accounts.find_user_by_username(username).await?;
        let hash = user
            .as_ref()
            .map_or_else(|| UNKNOWN_USER_HASH.clone(), |u| u.password_hash.clone());
        let presented = password.to_string();

        let verified = tokio::task::spawn_blocking(move || secret::verify_secret(&presented, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?;

        match user {
            Some(user) if verified => {
                tracing::info!(user_id = %user.id, "Password authentication successful");
                Ok(user)
            }
            _ => {
                tracing::debug!("Password authentication failed");
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
