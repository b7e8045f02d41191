use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tollgate_auth::storage::{ClientKeyStorage, ClientStorage};
use tollgate_auth::types::{Client, ClientKey};
use tollgate_auth::{AuthError, AuthResult};

use crate::storage::InMemoryAuthStorage;

#[async_trait]
impl ClientStorage for InMemoryAuthStorage {
    async fn find_client(&self, client_id: &str) -> AuthResult<Client> {
        self.state
            .read()
            .await
            .clients
            .get(client_id)
            .cloned()
            .ok_or_else(|| AuthError::not_found(format!("client {client_id}")))
    }

    async fn insert_client(&self, client: &Client) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.clients.contains_key(&client.client_id) {
            return Err(AuthError::conflict(format!(
                "client {} already exists",
                client.client_id
            )));
        }
        state
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn update_client(&self, client: &Client) -> AuthResult<()> {
        let mut state = self.state.write().await;
        match state.clients.get_mut(&client.client_id) {
            Some(existing) => {
                *existing = client.clone();
                Ok(())
            }
            None => Err(AuthError::not_found(format!("client {}", client.client_id))),
        }
    }
}

#[async_trait]
impl ClientKeyStorage for InMemoryAuthStorage {
    async fn add_key(&self, key: &ClientKey) -> AuthResult<()> {
        let mut state = self.state.write().await;
        if state.keys.iter().any(|k| {
            k.issuer == key.issuer && k.subject == key.subject && k.key_id == key.key_id
        }) {
            return Err(AuthError::conflict(format!(
                "key {} already registered for {}/{}",
                key.key_id, key.issuer, key.subject
            )));
        }
        state.keys.push(key.clone());
        Ok(())
    }

    async fn get_key(&self, issuer: &str, subject: &str, key_id: &str) -> AuthResult<Jwk> {
        self.state
            .read()
            .await
            .keys
            .iter()
            .find(|k| k.issuer == issuer && k.subject == subject && k.key_id == key_id)
            .map(|k| k.jwk.clone())
            .ok_or_else(|| AuthError::not_found(format!("key {key_id}")))
    }

    async fn get_key_set(&self, issuer: &str, subject: &str) -> AuthResult<JwkSet> {
        let keys = self
            .state
            .read()
            .await
            .keys
            .iter()
            .filter(|k| k.issuer == issuer && k.subject == subject)
            .map(|k| k.jwk.clone())
            .collect();
        Ok(JwkSet { keys })
    }

    async fn get_key_scopes(
        &self,
        issuer: &str,
        subject: &str,
        key_id: &str,
    ) -> AuthResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .keys
            .iter()
            .find(|k| k.issuer == issuer && k.subject == subject && k.key_id == key_id)
            .map(|k| k.scopes.clone())
            .unwrap_or_default())
    }
}
