use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate auth storage administration")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML). Missing files are ignored.
    #[arg(short, long, global = true, env = "TOLLGATE_CONFIG", default_value = "tollgate.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create missing tables and indexes
    Schema,
    /// Seed scopes, the admin account, default clients and the initial key
    Bootstrap(BootstrapArgs),
    /// Delete expired nonces and client assertion JTIs
    PurgeReplay,
    /// Generate a fresh verification code and email it
    ResendCode(ResendArgs),
}

#[derive(clap::Args)]
pub struct BootstrapArgs {
    /// JWK file registered as the initial client key (overrides bootstrap.initial_key_file)
    #[arg(long)]
    pub key_file: Option<PathBuf>,
    /// Apply the schema before seeding
    #[arg(long)]
    pub with_schema: bool,
}

#[derive(clap::Args)]
pub struct ResendArgs {
    /// Subject table: student_temps, teacher_temps, admin_temps or users
    #[arg(long = "type", value_name = "TABLE")]
    pub subject_type: String,
    /// Subject id
    #[arg(long, conflicts_with = "username", required_unless_present = "username")]
    pub id: Option<Uuid>,
    /// Subject username
    #[arg(long)]
    pub username: Option<String>,
}
