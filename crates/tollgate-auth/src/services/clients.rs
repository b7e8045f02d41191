//! Client registration, secret rotation and authentication.

use std::sync::Arc;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientStorage;
use crate::types::{Client, GrantType};

/// Number of previous secrets kept by [`ClientRegistry::rotate_secret`] by default.
pub const DEFAULT_ROTATED_SECRETS: usize = 2;

pub struct ClientRegistry {
    storage: Arc<dyn ClientStorage>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    /// Validates, normalizes, hashes and inserts `client`.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidInput` or `AuthError::Conflict`.
    #[tracing::instrument(skip_all, fields(client_id = %client.client_id))]
    pub async fn register(&self, mut client: Client) -> AuthResult<Client> {
        client.validate()?;
        client.prepare_for_save()?;
        self.storage.insert_client(&client).await?;
        tracing::info!("Client registered");
        Ok(client)
    }

    /// Saves changes to an existing client through the same pipeline.
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidInput` or `AuthError::NotFound`.
    pub async fn update(&self, mut client: Client) -> AuthResult<Client> {
        client.validate()?;
        client.prepare_for_save()?;
        self.storage.update_client(&client).await?;
        Ok(client)
    }

    /// Installs `new_secret`, keeping up to `keep` previous secrets valid.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` if the client does not exist.
    #[tracing::instrument(skip(self, new_secret))]
    pub async fn rotate_secret(&self, client_id: &str, new_secret: &str, keep: usize) -> AuthResult<Client> {
        let mut client = self.storage.find_client(client_id).await?;
        client.rotate_secret(new_secret, keep);
        client.prepare_for_save()?;
        self.storage.update_client(&client).await?;
        tracing::info!(kept = client.rotated_secrets.len(), "Client secret rotated");
        Ok(client)
    }

    /// Returns the client if it is active and `presented` matches its
    /// current or a rotated secret. `None` on any mismatch.
    ///
    /// # Errors
    ///
    /// Storage errors only; an unknown client is `None`.
    #[tracing::instrument(skip(self, presented))]
    pub async fn authenticate(&self, client_id: &str, presented: &str) -> AuthResult<Option<Client>> {
        let client = match self.storage.find_client(client_id).await {
            Ok(client) => client,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if client.active && client.verify_secret(presented) {
            Ok(Some(client))
        } else {
            tracing::debug!("Client authentication failed");
            Ok(None)
        }
    }

    /// Checks an authorization or pushed authorization request against the
    /// client's registration and returns the client.
    ///
    /// The redirect URI must match a registered one exactly.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotFound` for an unknown client.
    /// - `AuthError::Invalidated` for an inactive client.
    /// - `AuthError::InvalidInput` naming `redirect_uri` or `grant_type`.
    #[tracing::instrument(skip(self))]
    pub async fn authorize_request(
        &self,
        client_id: &str,
        redirect_uri: &str,
        grant_type: GrantType,
    ) -> AuthResult<Client> {
        let client = self.storage.find_client(client_id).await?;
        if !client.active {
            return Err(AuthError::invalidated(format!("client {client_id}")));
        }
        if !client.is_grant_type_allowed(grant_type) {
            return Err(AuthError::invalid_field(
                "grant_type",
                format!("{grant_type} is not allowed for this client"),
            ));
        }
        if !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(AuthError::invalid_field(
                "redirect_uri",
                "is not registered for this client",
            ));
        }
        Ok(client)
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ClientStorage> {
        &self.storage
    }
}
