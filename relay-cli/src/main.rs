//! Relay CLI
//!
//! Command-line interface for submitting and inspecting jobs through the
//! orchestrator.

mod api;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Debug, Parser)]
#[command(name = "relay")]
#[command(about = "Relay work queue CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "RELAY_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    /// Owner ID sent with every request
    #[arg(long, env = "RELAY_OWNER_ID")]
    owner: i64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
        owner_id: cli.owner,
    };

    handle_command(cli.command, &config).await
}
