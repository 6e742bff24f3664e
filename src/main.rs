//! volnas - Main Entry Point
//!
//! Inspect the operation registry and probe operation shapes.

use clap::Parser;
use volnas::cli::{cmd_list, cmd_probe, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "volnas=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { group } => {
            cmd_list(group.as_deref())?;
        }
        Commands::Probe { op, channels, size, batch, seed, config } => {
            cmd_probe(&op, channels, size, batch, seed, config.as_ref())?;
        }
    }

    Ok(())
}
