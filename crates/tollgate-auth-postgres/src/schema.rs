//! Embedded, idempotent schema.
//!
//! Every statement uses `IF NOT EXISTS`, so applying the schema to an
//! existing database is a no-op.

use sqlx_core::raw_sql::raw_sql;
use tollgate_auth::types::{ArtifactKind, SubjectKind};

use crate::{PgPool, StorageResult};

const SHARED: &str = include_str!("schema.sql");

/// DDL for one artifact table.
///
/// `active` stays NULL until the record is invalidated; `used` only matters
/// for pushed requests.
#[must_use]
pub fn artifact_table(kind: ArtifactKind) -> String {
    let table = kind.table_name();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    key TEXT PRIMARY KEY,
    request_id TEXT NOT NULL,
    client_id TEXT,
    session_id UUID REFERENCES sessions (id) ON DELETE SET NULL,
    active BOOLEAN,
    used BOOLEAN NOT NULL DEFAULT FALSE,
    requested_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ,
    deleted_at TIMESTAMPTZ,
    data JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS {table}_request_id_idx ON {table} (request_id);
"#
    )
}

/// DDL for one temporary-account table.
#[must_use]
pub fn temporary_table(kind: SubjectKind) -> String {
    let table = kind.table_name();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id UUID PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    subject_name TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
);
ALTER TABLE {table} ADD COLUMN IF NOT EXISTS deleted_at TIMESTAMPTZ;
"#
    )
}

/// The full schema as one script.
#[must_use]
pub fn script() -> String {
    let mut script = String::from(SHARED);
    for kind in ArtifactKind::ALL {
        script.push_str(&artifact_table(kind));
    }
    for kind in SubjectKind::TEMPORARY {
        script.push_str(&temporary_table(kind));
    }
    script
}

pub(crate) async fn apply(pool: &PgPool) -> StorageResult<()> {
    let script = script();
    raw_sql(&script).execute(pool).await?;
    tracing::info!("Auth schema applied");
    Ok(())
}
