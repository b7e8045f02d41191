//! Artifact and session storage.
//!
//! Each [`ArtifactKind`] lives in its own table. The full record is kept as
//! JSONB in `data`; the columns the lifecycle depends on (`active`, `used`,
//! `expires_at`, `deleted_at`) are authoritative and override the JSON on read.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tollgate_auth::storage::ArtifactStorage;
use tollgate_auth::types::{
    Artifact, ArtifactKind, ArtifactLookup, Client, Session, StoredArtifact, User,
};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::accounts::fetch_user;
use crate::{PostgresAuthStorage, StorageError, db_error, json_error};

type ArtifactRow = (
    serde_json::Value,
    Option<bool>,
    bool,
    Option<OffsetDateTime>,
    Option<serde_json::Value>,
    Option<serde_json::Value>,
);

/// Deletes session `$1` unless a live artifact of any kind still references it.
fn orphan_session_delete() -> String {
    let mut sql = String::from("DELETE FROM sessions WHERE id = $1");
    for kind in ArtifactKind::ALL {
        sql.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM {} WHERE session_id = $1 AND deleted_at IS NULL)",
            kind.table_name()
        ));
    }
    sql
}

#[async_trait]
impl ArtifactStorage for PostgresAuthStorage {
    async fn create(&self, artifact: &Artifact, session: Option<&Session>) -> AuthResult<()> {
        let mut artifact = artifact.clone();
        artifact.session_id = session.map(|s| s.id);
        let data = serde_json::to_value(&artifact).map_err(json_error)?;

        let mut tx = self.pool().begin().await.map_err(db_error)?;

        if let Some(session) = session {
            let session_data = serde_json::to_value(session).map_err(json_error)?;
            query(
                r#"
                INSERT INTO sessions (id, client_id, user_id, data)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE
                SET client_id = EXCLUDED.client_id,
                    user_id = EXCLUDED.user_id,
                    data = EXCLUDED.data
                "#,
            )
            .bind(session.id)
            .bind(&session.client_id)
            .bind(session.user_id)
            .bind(&session_data)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        let sql = format!(
            r#"
            INSERT INTO {} (key, request_id, client_id, session_id, active, used, requested_at, expires_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            artifact.kind.table_name()
        );
        query(&sql)
            .bind(&artifact.key)
            .bind(&artifact.request_id)
            .bind(&artifact.client_id)
            .bind(artifact.session_id)
            .bind(artifact.active)
            .bind(artifact.pushed.as_ref().is_some_and(|p| p.used))
            .bind(artifact.requested_at)
            .bind(artifact.expires_at)
            .bind(&data)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                let err = StorageError::from(e);
                if err.is_unique_violation() {
                    AuthError::conflict(format!("{} already exists", artifact.kind))
                } else {
                    err.into()
                }
            })?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn find_by_key(&self, kind: ArtifactKind, key: &str) -> AuthResult<ArtifactLookup> {
        let sql = format!(
            r#"
            SELECT a.data, a.active, a.used, a.expires_at, s.data, c.data
            FROM {} a
            LEFT JOIN sessions s ON s.id = a.session_id
            LEFT JOIN clients c ON c.client_id = a.client_id
            WHERE a.key = $1 AND a.deleted_at IS NULL
            "#,
            kind.table_name()
        );
        let row: Option<ArtifactRow> = query_as(&sql)
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(db_error)?;
        let (data, active, used, expires_at, session, client) =
            row.ok_or_else(|| AuthError::not_found(kind.as_str()))?;

        let mut artifact: Artifact = serde_json::from_value(data).map_err(json_error)?;
        artifact.active = active;
        artifact.expires_at = expires_at;
        if let Some(pushed) = artifact.pushed.as_mut() {
            pushed.used = used;
        }

        if kind == ArtifactKind::PushedRequest && artifact.is_expired(self.now()) {
            return Err(AuthError::expired(kind.as_str()));
        }

        let session: Option<Session> = session
            .map(serde_json::from_value)
            .transpose()
            .map_err(json_error)?;
        let client: Option<Client> = client
            .map(serde_json::from_value)
            .transpose()
            .map_err(json_error)?;
        let user: Option<User> = match session.as_ref().and_then(|s| s.user_id) {
            Some(user_id) => fetch_user(self.pool(), user_id).await?,
            None => None,
        };

        Ok(ArtifactLookup::from_stored(StoredArtifact {
            artifact,
            client,
            session,
            user,
        }))
    }

    async fn invalidate(&self, kind: ArtifactKind, key: &str) -> AuthResult<()> {
        let sql = format!(
            "UPDATE {} SET active = FALSE, used = TRUE WHERE key = $1",
            kind.table_name()
        );
        let result = query(&sql)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(AuthError::not_found(kind.as_str()));
        }
        Ok(())
    }

    async fn delete(&self, kind: ArtifactKind, key: &str) -> AuthResult<()> {
        let mut tx = self.pool().begin().await.map_err(db_error)?;
        let sql = format!(
            "DELETE FROM {} WHERE key = $1 RETURNING session_id",
            kind.table_name()
        );
        let session_id: Option<Option<Uuid>> = sqlx_core::query_scalar::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;

        if let Some(Some(session_id)) = session_id {
            query(&orphan_session_delete())
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn revoke_by_request_id(&self, kind: ArtifactKind, request_id: &str) -> AuthResult<u64> {
        let sql = format!(
            "UPDATE {} SET active = FALSE WHERE request_id = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        let revoked = query(&sql)
            .bind(request_id)
            .execute(self.pool())
            .await
            .map_err(db_error)?
            .rows_affected();
        if revoked == 0 {
            return Err(AuthError::not_found(format!(
                "{kind} for request {request_id}"
            )));
        }
        tracing::debug!(%kind, request_id, revoked, "Artifacts revoked");
        Ok(revoked)
    }
}

impl PostgresAuthStorage {
    /// Stamps `deleted_at` on an artifact. Returns `false` if the key is unknown.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update fails.
    pub async fn soft_delete_artifact(&self, kind: ArtifactKind, key: &str) -> AuthResult<bool> {
        let sql = format!(
            "UPDATE {} SET deleted_at = $2 WHERE key = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        let result = query(&sql)
            .bind(key)
            .bind(self.now())
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }
}
