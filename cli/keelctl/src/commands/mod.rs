//! CLI commands.

mod plans;
mod pods;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// keelctl - inspect and steer keel scheduler plans and pods.
#[derive(Debug, Parser)]
#[command(name = "keelctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the scheduler API.
    #[arg(long, global = true, env = "KEEL_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect and control plans.
    Plans(plans::PlansCommand),

    /// Inspect, restart and replace pod instances.
    Pods(pods::PodsCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            client: ApiClient::new(&self.url)?,
            format: self.output,
        };

        match self.command {
            Commands::Plans(cmd) => cmd.run(ctx).await,
            Commands::Pods(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("keelctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Context passed to every command.
pub struct CommandContext {
    pub client: ApiClient,
    pub format: OutputFormat,
}
