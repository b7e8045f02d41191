//! PostgreSQL storage backend for tollgate-auth
//!
//! Provides persistent storage for:
//!
//! - Protocol artifacts, one table per [`ArtifactKind`](tollgate_auth::ArtifactKind)
//! - Per-grant sessions
//! - OAuth clients and client keys
//! - Replay caches (nonces and client-assertion JTIs)
//! - Verification codes
//! - Temporary accounts, users, images, roles and scopes
//!
//! The schema is embedded and idempotent; [`PostgresAuthStorage::apply_schema`]
//! can run on every start.
//!
//! Time-dependent checks (expiry, replay windows) compare against the
//! injected clock rather than the database's `NOW()`.
//!
//! # Example
//!
//! ```ignore
//! use tollgate_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect(&config.database).await?;
//! storage.apply_schema().await?;
//!
//! let artifacts: Arc<dyn ArtifactStorage> = Arc::new(storage.clone());
//! ```

mod accounts;
mod artifacts;
mod clients;
mod replay;
pub mod schema;
mod verification;

use std::sync::Arc;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;
use time::OffsetDateTime;
use tollgate_auth::AuthError;
use tollgate_auth::clock::{SharedClock, system_clock};
use tollgate_auth::config::DatabaseConfig;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Serialization/deserialization of a JSONB column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    /// Returns `true` for a unique or primary key violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx_core::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        if err.is_unique_violation() {
            AuthError::conflict(err.to_string())
        } else {
            AuthError::storage(err.to_string())
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

pub(crate) fn db_error(err: sqlx_core::Error) -> AuthError {
    StorageError::from(err).into()
}

pub(crate) fn json_error(err: serde_json::Error) -> AuthError {
    StorageError::from(err).into()
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL implementation of every tollgate-auth storage trait.
#[derive(Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
    clock: SharedClock,
}

impl std::fmt::Debug for PostgresAuthStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAuthStorage")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self::with_clock(pool, system_clock())
    }

    #[must_use]
    pub fn with_clock(pool: Arc<PgPool>, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    /// Create new storage by connecting to the configured database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;
        tracing::info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates every table and index that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a DDL statement fails.
    pub async fn apply_schema(&self) -> StorageResult<()> {
        schema::apply(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_maps_to_storage() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(err.is_serialization_error());
        assert!(!err.is_unique_violation());

        let auth: AuthError = err.into();
        assert!(auth.is_server_error());
    }

    #[test]
    fn test_corrupt_row() {
        let err = StorageError::corrupt("unknown subject type: guest");
        assert!(!err.is_database_error());
        assert_eq!(err.to_string(), "Corrupt row: unknown subject type: guest");
        assert!(AuthError::from(err).is_server_error());
    }
}
