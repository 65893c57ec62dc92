//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Retry budget applied when a submission does not specify one
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// A unit of work tracked by the queue
///
/// Jobs are created `Pending` by the submission path and afterwards only
/// change through the lifecycle transitions (lease, ack, fail, expire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: i64,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub lease_holder: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub trace_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Builds a freshly submitted job with a new id and trace id
    pub fn new(
        owner_id: i64,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            status: JobStatus::Pending,
            payload,
            idempotency_key,
            retry_count: 0,
            max_retries,
            lease_holder: None,
            lease_expires_at: None,
            error_message: None,
            trace_id: Uuid::new_v4(),
            started_at: None,
            completed_at: None,
            created_at: now,
        }
    }

    /// Whether a worker may claim the job at `now`
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.lease_is_free(now)
    }

    /// Whether the job is running on a lease that lapsed before `now`
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running
            && self.lease_expires_at.is_some_and(|expires| expires < now)
    }

    pub(crate) fn lease_is_free(&self, now: DateTime<Utc>) -> bool {
        match self.lease_expires_at {
            None => true,
            Some(expires) => expires < now,
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    /// Reserved. No transition produces it; failures go back to `Pending`
    /// or straight to `Dlq`.
    Failed,
    Dlq,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Dlq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Dlq => "dlq",
        }
    }

    /// Whether the job has reached a state it never leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Dlq)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not one of the known states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "dlq" => Ok(JobStatus::Dlq),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
