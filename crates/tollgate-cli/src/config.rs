use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use tollgate_auth::AuthConfig;

/// Loads `.env` if present. A missing file is not an error.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }
}

/// Builds the configuration from the TOML file at `path` (skipped when
/// absent) overlaid with `TOLLGATE__SECTION__KEY` environment variables.
pub fn load_config(path: &Path) -> Result<AuthConfig> {
    load_config_with_env(path, Environment::with_prefix("TOLLGATE"))
}

fn load_config_with_env(path: &Path, env: Environment) -> Result<AuthConfig> {
    let mut builder = Config::builder();
    if path.exists() {
        builder = builder.add_source(File::from(path));
    }
    // e.g. TOLLGATE__DATABASE__URL=postgres://...
    builder = builder.add_source(env.prefix_separator("__").separator("__").try_parsing(true));

    let merged: AuthConfig = builder
        .build()
        .context("config build error")?
        .try_deserialize()
        .context("config deserialize error")?;
    merged.validate()?;
    Ok(merged)
}
