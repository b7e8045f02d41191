//! Nonce and JTI caches.
//!
//! Both are hard-delete tables. Linearizability per key comes from single
//! statements: `DELETE ... RETURNING` for nonces and a guarded upsert for JTIs.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use time::{Duration, OffsetDateTime};
use tollgate_auth::storage::{JtiStorage, NonceStorage};
use tollgate_auth::types::ReplayStatus;
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::{PostgresAuthStorage, db_error};

#[async_trait]
impl NonceStorage for PostgresAuthStorage {
    async fn issue_nonce(&self, bound_token: &str, ttl: Duration) -> AuthResult<String> {
        let value = Uuid::new_v4().to_string();
        query("INSERT INTO nonces (bound_token, value, expires_at) VALUES ($1, $2, $3)")
            .bind(bound_token)
            .bind(&value)
            .bind(self.now() + ttl)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        Ok(value)
    }

    async fn consume_nonce(&self, bound_token: &str, nonce: &str) -> AuthResult<()> {
        let expires_at: Option<OffsetDateTime> = query_scalar(
            "DELETE FROM nonces WHERE bound_token = $1 AND value = $2 RETURNING expires_at",
        )
        .bind(bound_token)
        .bind(nonce)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;

        match expires_at {
            None => Err(AuthError::not_found("nonce")),
            Some(at) if at <= self.now() => Err(AuthError::expired("nonce")),
            Some(_) => Ok(()),
        }
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let result = query("DELETE FROM nonces WHERE expires_at <= $1")
            .bind(self.now())
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JtiStorage for PostgresAuthStorage {
    async fn check_assertion(&self, jti: &str) -> AuthResult<ReplayStatus> {
        let known: bool = query_scalar(
            "SELECT EXISTS (SELECT 1 FROM client_jwts WHERE jti = $1 AND active AND expires_at > $2)",
        )
        .bind(jti)
        .bind(self.now())
        .fetch_one(self.pool())
        .await
        .map_err(db_error)?;
        Ok(if known {
            ReplayStatus::Known
        } else {
            ReplayStatus::Free
        })
    }

    async fn record_assertion(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        // The update branch only fires for a stale entry; a live one yields no row.
        let recorded: Option<String> = query_scalar(
            r#"
            INSERT INTO client_jwts (jti, expires_at, active)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (jti) DO UPDATE
            SET expires_at = EXCLUDED.expires_at, active = TRUE
            WHERE client_jwts.expires_at <= $3 OR NOT client_jwts.active
            RETURNING jti
            "#,
        )
        .bind(jti)
        .bind(expires_at)
        .bind(self.now())
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;

        if recorded.is_none() {
            return Err(AuthError::replay_detected(format!("jti {jti}")));
        }
        Ok(())
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let result = query("DELETE FROM client_jwts WHERE expires_at <= $1")
            .bind(self.now())
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}
