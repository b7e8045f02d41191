use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgConnection;
use time::OffsetDateTime;
use tollgate_auth::storage::VerificationCodeStorage;
use tollgate_auth::types::{SubjectKind, SubjectRef, VerificationCode};
use tollgate_auth::{AuthError, AuthResult};
use uuid::Uuid;

use crate::{PostgresAuthStorage, StorageError, db_error};

type CodeRow = (
    Uuid,
    String,
    Uuid,
    String,
    OffsetDateTime,
    Option<OffsetDateTime>,
    OffsetDateTime,
);

fn code_from_row(row: CodeRow) -> AuthResult<VerificationCode> {
    let (id, subject_type, subject_id, code_hash, expires_at, used_at, created_at) = row;
    let kind: SubjectKind = subject_type
        .parse()
        .map_err(|_| StorageError::corrupt(format!("unknown subject type: {subject_type}")))?;
    Ok(VerificationCode {
        id,
        subject: SubjectRef::new(kind, subject_id),
        code_hash,
        expires_at,
        used_at,
        created_at,
    })
}

pub(crate) async fn upsert_code(
    conn: &mut PgConnection,
    subject: SubjectRef,
    code_hash: &str,
    expires_at: OffsetDateTime,
    now: OffsetDateTime,
) -> AuthResult<VerificationCode> {
    let row: CodeRow = query_as(
        r#"
        INSERT INTO verification_codes (id, subject_type, subject_id, code_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (subject_type, subject_id) DO UPDATE
        SET code_hash = EXCLUDED.code_hash,
            expires_at = EXCLUDED.expires_at,
            used_at = NULL
        RETURNING id, subject_type, subject_id, code_hash, expires_at, used_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subject.kind.as_str())
    .bind(subject.id)
    .bind(code_hash)
    .bind(expires_at)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(db_error)?;
    code_from_row(row)
}

#[async_trait]
impl VerificationCodeStorage for PostgresAuthStorage {
    async fn upsert_code(
        &self,
        subject: SubjectRef,
        code_hash: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<VerificationCode> {
        let mut conn = self.pool().acquire().await.map_err(db_error)?;
        upsert_code(&mut conn, subject, code_hash, expires_at, self.now()).await
    }

    async fn find_code(&self, subject: SubjectRef, code_hash: &str) -> AuthResult<VerificationCode> {
        let row: Option<CodeRow> = query_as(
            r#"
            SELECT id, subject_type, subject_id, code_hash, expires_at, used_at, created_at
            FROM verification_codes
            WHERE subject_type = $1 AND subject_id = $2 AND code_hash = $3
            "#,
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .bind(code_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_error)?;
        row.map(code_from_row).unwrap_or(Err(AuthError::NotCode))
    }

    async fn mark_used(&self, code_id: Uuid, used_at: OffsetDateTime) -> AuthResult<()> {
        let result = query("UPDATE verification_codes SET used_at = $2 WHERE id = $1 AND used_at IS NULL")
            .bind(code_id)
            .bind(used_at)
            .execute(self.pool())
            .await
            .map_err(db_error)?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: bool = sqlx_core::query_scalar::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM verification_codes WHERE id = $1)",
        )
        .bind(code_id)
        .fetch_one(self.pool())
        .await
        .map_err(db_error)?;
        if exists {
            Err(AuthError::AlreadyUsed)
        } else {
            Err(AuthError::not_found("verification code"))
        }
    }
}
