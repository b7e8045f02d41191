use std::sync::Arc;

use anyhow::{Context, Result};
use tollgate_auth::config::ReplayConfig;
use tollgate_auth::services::ReplayGuard;
use tollgate_auth_postgres::PostgresAuthStorage;

use crate::output::print_success;

pub async fn purge(storage: Arc<PostgresAuthStorage>, config: &ReplayConfig) -> Result<()> {
    let guard = ReplayGuard::new(storage.clone(), storage, config);
    let report = guard
        .purge_expired()
        .await
        .context("failed to purge replay caches")?;
    print_success(&format!(
        "Purged {} nonce(s) and {} assertion JTI(s)",
        report.nonces, report.assertions
    ));
    Ok(())
}
