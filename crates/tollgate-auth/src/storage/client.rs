//! Client registry storage.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Storage for OAuth client registrations.
///
/// Backends persist clients as given. Secret hashing is a stage of the save
/// path ([`Client::prepare_for_save`]), not something storage does.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if no client has this ID.
    async fn find_client(&self, client_id: &str) -> AuthResult<Client>;

    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if the client ID is taken.
    async fn insert_client(&self, client: &Client) -> AuthResult<()>;

    /// # Errors
    ///
    /// Returns `AuthError::NotFound` if the client does not exist.
    async fn update_client(&self, client: &Client) -> AuthResult<()>;
}
