//! Configuration CLI commands.

use clap::Subcommand;
use sentinel_mirror::config::{default_config_path, default_requests_path};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the default configuration file path
    Path,

    /// Show the default request file path
    RequestsPath,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => println!("{}", default_config_path().display()),
        ConfigCommands::RequestsPath => println!("{}", default_requests_path().display()),
    }
    Ok(())
}
