//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod metrics;

use anyhow::Result;
use clap::Subcommand;

use crate::api::ApiClient;
use crate::config::Config;

/// Top-level CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a job
    Submit {
        /// Job payload as JSON, e.g. '{"kind":"sleep","duration":2}'
        #[arg(long)]
        payload: String,

        /// Retries allowed before the job is dead-lettered
        #[arg(long)]
        max_retries: Option<u32>,

        /// Key making repeated submissions return the same job
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Get job details
    Get {
        /// Job ID
        id: String,
    },
    /// List jobs, newest first
    List {
        /// Only jobs in this status (pending, running, done, failed, dlq)
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Show queue metrics
    Metrics,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.orchestrator_url, config.owner_id);

    match command {
        Commands::Submit {
            payload,
            max_retries,
            idempotency_key,
        } => job::submit_job(&client, &payload, max_retries, idempotency_key).await,
        Commands::Get { id } => job::get_job(&client, &id).await,
        Commands::List {
            status,
            page,
            per_page,
        } => job::list_jobs(&client, status, page, per_page).await,
        Commands::Metrics => metrics::show_metrics(&client).await,
    }
}
