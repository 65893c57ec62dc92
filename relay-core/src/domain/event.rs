//! Job change notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// Emitted after every persisted state change of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub owner_id: i64,
    pub status: JobStatus,
    pub occurred_at: DateTime<Utc>,
}

impl JobEvent {
    pub fn for_job(job: &Job, occurred_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            owner_id: job.owner_id,
            status: job.status,
            occurred_at,
        }
    }
}
