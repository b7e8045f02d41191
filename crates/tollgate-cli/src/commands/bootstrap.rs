use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use jsonwebtoken::jwk::Jwk;
use tollgate_auth::AuthConfig;
use tollgate_auth::clock::system_clock;
use tollgate_auth::services::{Bootstrapper, ClientRegistry, INITIAL_KEY_ID};
use tollgate_auth_postgres::PostgresAuthStorage;

use crate::cli::BootstrapArgs;
use crate::output::{print_success, print_table, print_warning};

pub async fn run(
    storage: Arc<PostgresAuthStorage>,
    config: &AuthConfig,
    args: &BootstrapArgs,
) -> Result<()> {
    if args.with_schema {
        super::schema::apply(&storage).await?;
    }

    let key_file = args
        .key_file
        .as_deref()
        .or(config.bootstrap.initial_key_file.as_deref());
    let initial_key = key_file.map(read_jwk).transpose()?;
    if initial_key.is_none() {
        print_warning("No initial key file configured, skipping client key");
    }

    let bootstrapper = Bootstrapper::new(
        storage.clone(),
        storage.clone(),
        ClientRegistry::new(storage.clone()),
        storage,
        system_clock(),
    );
    let report = bootstrapper
        .run(&config.bootstrap, &config.accounts, initial_key)
        .await
        .context("bootstrap failed")?;

    let clients = if report.clients_created.is_empty() {
        "-".to_string()
    } else {
        report.clients_created.join(", ")
    };
    print_table(
        ["Seed", "Result"],
        &[
            ("Scopes created".to_string(), report.scopes_created.to_string()),
            ("Admin account".to_string(), created(report.admin_created)),
            ("Clients created".to_string(), clients),
            (format!("Key {INITIAL_KEY_ID}"), created(report.key_registered)),
        ],
    );

    if !report.generated_secrets.is_empty() {
        print_warning("Generated client secrets are shown once:");
        print_table(["Client", "Secret"], &report.generated_secrets);
    }
    print_success("Bootstrap complete");
    Ok(())
}

fn created(flag: bool) -> String {
    let label = if flag { "created" } else { "already present" };
    label.to_string()
}

fn read_jwk(path: &Path) -> Result<Jwk> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON Web Key", path.display()))
}
