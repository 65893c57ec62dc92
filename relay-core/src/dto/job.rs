//! Job DTOs for inter-service communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// Request to submit a new job
///
/// Fields are loosely typed on purpose: the orchestrator validates them and
/// reports every problem at once instead of failing on the first bad field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitJob {
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<serde_json::Value>,
}

/// Response to a submission, for both fresh jobs and idempotent replays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub trace_id: Uuid,
    pub message: String,
}

/// Public view of a job
///
/// Lease internals (holder, expiry) stay inside the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub owner_id: i64,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub trace_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            owner_id: job.owner_id,
            status: job.status,
            payload: job.payload,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error_message: job.error_message,
            trace_id: job.trace_id,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

/// Query string of `GET /api/jobs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: i64) -> Self {
        let per_page_count = i64::from(per_page.max(1));
        Self {
            page,
            per_page,
            total,
            total_pages: (total + per_page_count - 1) / per_page_count,
        }
    }
}

/// One page of an owner's jobs, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobView>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_view_conversion() {
        let mut job = Job::new(7, serde_json::json!({"kind": "compute"}), None, 3, Utc::now());
        job.lease_holder = Some("worker-1".to_string());

        let view: JobView = job.clone().into();
        assert_eq!(view.id, job.id);
        assert_eq!(view.owner_id, 7);
        assert_eq!(view.trace_id, job.trace_id);

        let value = serde_json::to_value(&view).unwrap();
        assert!(value.get("lease_holder").is_none());
    }

    #[test]
    fn test_pagination_rounds_up() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).total_pages, 2);
    }

    #[test]
    fn test_submit_job_accepts_missing_fields() {
        let req: SubmitJob = serde_json::from_str("{}").unwrap();
        assert!(req.payload.is_none());
        assert!(req.max_retries.is_none());
    }
}
