mod check;
mod run;

pub use check::CheckConfigCommand;
pub use run::RunCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Schellar - cron-style scheduling for Conductor workflows
#[derive(Parser, Debug)]
#[command(name = "schellar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler daemon and REST API.
    Run(RunCommand),

    /// Validate the configuration.
    CheckConfig(CheckConfigCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::CheckConfig(cmd) => cmd.execute().await,
        }
    }
}
