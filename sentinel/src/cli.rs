//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::AppContext;
use crate::commands;

/// Keeps an agent deployed from git and applies signed admin commands
#[derive(Parser)]
#[command(name = "sentinel", version, propagate_version = true)]
pub struct Cli {
    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the deployer and the admin command channel
    Run,

    /// Exchange a signup token for an agent identity
    Provision(commands::provision::ProvisionArgs),

    /// Use the agent key pair
    #[command(subcommand)]
    Keychain(commands::keychain::KeychainCommand),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or the command fails.
    pub async fn run(self) -> Result<()> {
        let app = AppContext::from_env()?;
        match self.command.unwrap_or(Command::Run) {
            Command::Run => commands::run::run(&app).await,
            Command::Provision(args) => commands::provision::run(&app, &args).await,
            Command::Keychain(cmd) => commands::keychain::run(&app, cmd),
        }
    }
}
