//! keelctl - operator CLI for the keel scheduler
//!
//! Shows deployment, recovery and decommission plans and steers them
//! through the scheduler's plans API.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
