//! Metrics command handler

use anyhow::Result;
use colored::*;
use relay_core::dto::metrics::StatusCounts;

use crate::api::ApiClient;

pub async fn show_metrics(client: &ApiClient) -> Result<()> {
    let metrics = client.metrics().await?;

    println!("{}", "System:".bold());
    print_counts(&metrics.system.counts);
    println!(
        "    retries:  {} across {} job(s)",
        metrics.system.retries.total_retries, metrics.system.retries.jobs_with_retries
    );
    println!();

    println!("{}", "Last 24 hours:".bold());
    println!("    submitted: {}", metrics.last_24h.submitted);
    println!("    completed: {}", metrics.last_24h.completed.to_string().green());
    println!("    failed:    {}", metrics.last_24h.failed.to_string().red());
    println!();

    println!("{}", "Your jobs:".bold());
    print_counts(&metrics.owner.counts);
    println!("    concurrent: {}", metrics.owner.concurrent.to_string().cyan());

    Ok(())
}

fn print_counts(counts: &StatusCounts) {
    println!("    total:    {}", counts.total);
    println!("    pending:  {}", counts.pending.to_string().yellow());
    println!("    running:  {}", counts.running.to_string().cyan());
    println!("    done:     {}", counts.done.to_string().green());
    println!("    failed:   {}", counts.failed.to_string().red());
    println!("    dlq:      {}", counts.dlq.to_string().red().bold());
}
