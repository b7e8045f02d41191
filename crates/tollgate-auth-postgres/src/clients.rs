//! OAuth client and client key storage.
//!
//! Clients are stored whole as JSONB; secrets arrive already hashed.

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use tollgate_auth::storage::{ClientKeyStorage, ClientStorage};
use tollgate_auth::types::{Client, ClientKey};
use tollgate_auth::{AuthError, AuthResult};

use crate::{PostgresAuthStorage, StorageError, db_error, json_error};

#[async_trait]
impl ClientStorage for PostgresAuthStorage {
    async fn find_client(&self, client_id: &str) -> AuthResult<Client> {
        let data: Option<serde_json::Value> =
            query_scalar("SELECT data FROM clients WHERE client_id = $1")
                .bind(client_id)
                .fetch_optional(self.pool())
                .await
                .map_err(db_error)?;
        let data = data.ok_or_else(|| AuthError::not_found(format!("client {client_id}")))?;
        serde_json::from_value(data).map_err(json_error)
    }

    async fn insert_client(&self, client: &Client) -> AuthResult<()> {
        let data = serde_json::to_value(client).map_err(json_error)?;
        query("INSERT INTO clients (client_id, active, data) VALUES ($1, $2, $3)")
            .bind(&client.client_id)
            .bind(client.active)
            .bind(&data)
            .execute(self.pool())
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                if err.is_unique_violation() {
                    AuthError::conflict(format!("client {} already exists", client.client_id))
                } else {
                    err.into()
                }
            })?;
        tracing::debug!(client_id = %client.client_id, "Client stored");
        Ok(())
    }

    async fn update_client(&self, client: &Client) -> AuthResult<()> {
        let data = serde_json::to_value(client).map_err(json_error)?;
        let result = query(
            r#"
            UPDATE clients
            SET active = $2, data = $3, updated_at = NOW()
            WHERE client_id = $1
            "#,
        )
        .bind(&client.client_id)
        .bind(client.active)
        .bind(&data)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AuthError::not_found(format!("client {}", client.client_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientKeyStorage for PostgresAuthStorage {
    async fn add_key(&self, key: &ClientKey) -> AuthResult<()> {
        let jwk = serde_json::to_value(&key.jwk).map_err(json_error)?;
        query(
            r#"
            INSERT INTO client_keys (id, client_id, issuer, subject, key_id, jwk, scopes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(key.id)
        .bind(&key.client_id)
        .bind(&key.issuer)
        .bind(&key.subject)
        .bind(&key.key_id)
        .bind(&jwk)
        .bind(&key.scopes)
        .execute(self.pool())
        .await
        .map_err(|e| {
            let err = StorageError::from(e);
            if err.is_unique_violation() {
                AuthError::conflict(format!(
                    "key {} already registered for {}/{}",
                    key.key_id, key.issuer, key.subject
                ))
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    async fn get_key(&self, issuer: &str, subject: &str, key_id: &str) -> AuthResult<Jwk> {
        let jwk: Option<serde_json::Value> = query_scalar(
            "SELECT jwk FROM client_keys WHERE issuer = $1 AND subject = $2 AND key_id = $3",
        )
        .bind(issuer)
        .bind(subject)
        .bind(key_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;
        let jwk = jwk.ok_or_else(|| AuthError::not_found(format!("key {key_id}")))?;
        serde_json::from_value(jwk).map_err(json_error)
    }

    async fn get_key_set(&self, issuer: &str, subject: &str) -> AuthResult<JwkSet> {
        let rows: Vec<serde_json::Value> = query_scalar(
            r#"
            SELECT jwk FROM client_keys
            WHERE issuer = $1 AND subject = $2
            ORDER BY created_at
            "#,
        )
        .bind(issuer)
        .bind(subject)
        .fetch_all(self.pool())
        .await
        .map_err(db_error)?;
        let keys = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Jwk>, _>>()
            .map_err(json_error)?;
        Ok(JwkSet { keys })
    }

    async fn get_key_scopes(
        &self,
        issuer: &str,
        subject: &str,
        key_id: &str,
    ) -> AuthResult<Vec<String>> {
        let scopes: Option<Vec<String>> = query_scalar(
            "SELECT scopes FROM client_keys WHERE issuer = $1 AND subject = $2 AND key_id = $3",
        )
        .bind(issuer)
        .bind(subject)
        .bind(key_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;
        Ok(scopes.unwrap_or_default())
    }
}
