pub mod bootstrap;
pub mod replay;
pub mod resend;
pub mod schema;

use std::sync::Arc;

use anyhow::{Context, Result};
use tollgate_auth::AuthConfig;
use tollgate_auth_postgres::PostgresAuthStorage;

pub async fn connect(config: &AuthConfig) -> Result<Arc<PostgresAuthStorage>> {
    let storage = PostgresAuthStorage::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(storage))
}
