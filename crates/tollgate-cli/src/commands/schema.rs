use anyhow::{Context, Result};
use tollgate_auth_postgres::PostgresAuthStorage;

use crate::output::print_success;

pub async fn apply(storage: &PostgresAuthStorage) -> Result<()> {
    storage
        .apply_schema()
        .await
        .context("failed to apply schema")?;
    print_success("Schema is up to date");
    Ok(())
}
