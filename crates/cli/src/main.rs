//! Pricecheck CLI - operator tools for a terminal's local state.
//!
//! # Usage
//!
//! ```bash
//! # Look up a barcode in the offline catalog
//! pricecheck lookup 4006381333931
//!
//! # Download the catalog from the backend and replace the local copy
//! pricecheck sync
//!
//! # Show (and if needed create) the device identity
//! pricecheck device
//!
//! # Empty the local catalog
//! pricecheck clear
//!
//! # Inspect or drop the asset cache
//! pricecheck cache list
//! pricecheck cache purge
//! ```
//!
//! Every command reads the same `PRICECHECK_*` environment as the terminal,
//! so it operates on the terminal's data directory. Stop the terminal before
//! purging its cache.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use pricecheck_terminal::config::TerminalConfig;

mod commands;

#[derive(Parser)]
#[command(name = "pricecheck")]
#[command(author, version, about = "Pricecheck terminal tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a product by barcode in the local catalog
    Lookup {
        /// Barcode as printed on the label
        barcode: String,
    },
    /// Replace the local catalog with the backend's
    Sync,
    /// Show the device identity, creating one if none exists
    Device,
    /// Remove every product from the local catalog
    Clear,
    /// Manage the asset cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cache namespaces, oldest first
    List,
    /// Delete every cache namespace
    Purge,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricecheck=info,pricecheck_terminal=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = TerminalConfig::from_env()?;

    match cli.command {
        Commands::Lookup { barcode } => commands::catalog::lookup(&config, &barcode).await?,
        Commands::Sync => commands::catalog::sync(&config).await?,
        Commands::Device => commands::device::show(&config).await?,
        Commands::Clear => {
            commands::catalog::clear(&config).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::List => commands::cache::list(&config).await?,
            CacheAction::Purge => {
                commands::cache::purge(&config).await?;
            }
        },
    }
    Ok(())
}
