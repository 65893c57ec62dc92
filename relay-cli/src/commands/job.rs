//! Job command handlers
//!
//! Submission, single job details and paginated listing.

use anyhow::{Context, Result};
use colored::*;
use relay_core::domain::job::JobStatus;
use relay_core::dto::job::{JobView, ListJobsQuery, SubmitJob};
use serde_json::Value;
use uuid::Uuid;

use crate::api::ApiClient;

/// Submit a job and print its identifiers
pub async fn submit_job(
    client: &ApiClient,
    payload: &str,
    max_retries: Option<u32>,
    idempotency_key: Option<String>,
) -> Result<()> {
    let req = build_submission(payload, max_retries, idempotency_key)?;
    let response = client.submit_job(&req).await?;

    println!("{} {}", "✓".green(), response.message.bold());
    println!("  ID:       {}", response.id.to_string().cyan());
    println!("  Status:   {}", colorize_status(&response.status));
    println!("  Trace ID: {}", response.trace_id.to_string().dimmed());

    Ok(())
}

/// Get and display a single job
pub async fn get_job(client: &ApiClient, id: &str) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("Invalid job ID: {}", id))?;

    match client.get_job(id).await {
        Ok(job) => {
            print_job_details(&job);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{}", format!("Job {} not found.", id).yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// List jobs, one page at a time
pub async fn list_jobs(
    client: &ApiClient,
    status: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
) -> Result<()> {
    let query = ListJobsQuery {
        status,
        page,
        per_page,
    };
    let result = client.list_jobs(&query).await?;

    if result.jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    let p = result.pagination;
    println!(
        "{}",
        format!(
            "Showing {} of {} job(s) (page {}/{}):",
            result.jobs.len(),
            p.total,
            p.page,
            p.total_pages
        )
        .bold()
    );
    println!();
    for job in &result.jobs {
        print_job_summary(job);
    }

    Ok(())
}

fn build_submission(
    payload: &str,
    max_retries: Option<u32>,
    idempotency_key: Option<String>,
) -> Result<SubmitJob> {
    let payload: Value = serde_json::from_str(payload).context("Payload must be valid JSON")?;

    Ok(SubmitJob {
        payload: Some(payload),
        idempotency_key,
        max_retries: max_retries.map(Value::from),
    })
}

fn print_job_summary(job: &JobView) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Status:   {}", colorize_status(&job.status));
    println!(
        "    Retries:  {}/{}",
        job.retry_count, job.max_retries
    );
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_job_details(job: &JobView) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Status:      {}", colorize_status(&job.status));
    println!("  Trace ID:    {}", job.trace_id.to_string().dimmed());
    println!("  Retries:     {}/{}", job.retry_count, job.max_retries);
    println!("  Created:     {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = job.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let seconds = completed.signed_duration_since(started).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }

    if let Some(error) = &job.error_message {
        println!("  Error:       {}", error.red());
    }

    println!("  Payload:     {}", job.payload);
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Done => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Dlq => status_str.red().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_submission() {
        let req = build_submission(r#"{"kind":"sleep","duration":2}"#, Some(5), None).unwrap();
        assert_eq!(req.payload, Some(json!({"kind": "sleep", "duration": 2})));
        assert_eq!(req.max_retries, Some(json!(5)));
        assert!(req.idempotency_key.is_none());

        // Omitted retries let the server apply its default
        let body = serde_json::to_value(build_submission("{}", None, Some("k".into())).unwrap())
            .unwrap();
        assert_eq!(body, json!({"payload": {}, "idempotency_key": "k"}));
    }

    #[test]
    fn test_build_submission_rejects_bad_json() {
        assert!(build_submission("{kind: sleep}", None, None).is_err());
    }
}
