mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    config::load_dotenv();

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    observability::init_tracing(&cfg.logging);
    tracing::debug!(path = %cli.config.display(), "Configuration loaded");

    let storage = commands::connect(&cfg).await?;

    match &cli.command {
        Commands::Schema => commands::schema::apply(&storage).await?,
        Commands::Bootstrap(args) => commands::bootstrap::run(storage, &cfg, args).await?,
        Commands::PurgeReplay => commands::replay::purge(storage, &cfg.replay).await?,
        Commands::ResendCode(args) => commands::resend::run(storage, &cfg, args).await?,
    }

    Ok(())
}
