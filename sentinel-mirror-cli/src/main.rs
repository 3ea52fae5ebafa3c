//! Sentinel Mirror CLI - keep a local mirror of Copernicus hub products.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::status::StatusArgs;
use commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "sentinel-mirror")]
#[command(about = "Mirror Sentinel products from a Copernicus hub", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with the hub and sync every request in the request file
    Sync {
        /// Configuration file (default: ~/.config/sentinel-mirror/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Request file, `;`-separated with a header row
        #[arg(long)]
        requests: Option<PathBuf>,

        /// Do not draw transfer progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the ledger status counts of every request
    Status {
        /// Configuration file (default: ~/.config/sentinel-mirror/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Request file, `;`-separated with a header row
        #[arg(long)]
        requests: Option<PathBuf>,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            config,
            requests,
            no_progress,
        } => commands::sync::run(SyncArgs {
            config,
            requests,
            no_progress,
        }),
        Commands::Status { config, requests } => {
            commands::status::run(StatusArgs { config, requests })
        }
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
