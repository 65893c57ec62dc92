//! In-memory job store for tests and local development
//!
//! A single mutex guards the whole table, so every check-then-write sequence
//! (idempotency uniqueness, transition preconditions) is atomic in the same
//! way a conditional `UPDATE` is in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::domain::job::{Job, JobStatus};
use relay_core::dto::metrics::{RetrySummary, StatusCounts, WindowSummary};
use relay_core::lifecycle::{JobUpdate, Precondition};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{IdempotencyScope, JobFilter, JobStore};
use crate::error::{Result, StoreError};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    scope: IdempotencyScope,
    // Insertion order doubles as the tie-breaker for equal timestamps
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobStore {
    pub fn new(scope: IdempotencyScope) -> Self {
        Self {
            scope,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn arc(scope: IdempotencyScope) -> Arc<Self> {
        Arc::new(Self::new(scope))
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<Uuid> {
        let mut jobs = self.jobs();

        if let Some(key) = job.idempotency_key.as_deref() {
            if jobs
                .iter()
                .any(|existing| self.scope.collides(existing, job.owner_id, key))
            {
                return Err(StoreError::DuplicateIdempotencyKey(key.to_string()));
            }
        }

        jobs.push(job.clone());
        Ok(job.id)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs().iter().find(|job| job.id == id).cloned())
    }

    async fn find_by_idempotency_key(&self, owner_id: i64, key: &str) -> Result<Option<Job>> {
        Ok(self
            .jobs()
            .iter()
            .find(|job| job.owner_id == owner_id && job.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn list_claimable(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let mut claimable: Vec<Job> = self
            .jobs()
            .iter()
            .filter(|job| job.is_claimable(now))
            .cloned()
            .collect();

        claimable.sort_by_key(|job| job.created_at);
        claimable.truncate(limit);
        Ok(claimable)
    }

    async fn list_expired_leases(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let mut expired: Vec<Job> = self
            .jobs()
            .iter()
            .filter(|job| job.lease_expired(now))
            .cloned()
            .collect();

        expired.sort_by_key(|job| job.lease_expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn count_running_for_owner(&self, owner_id: i64) -> Result<i64> {
        let count = self
            .jobs()
            .iter()
            .filter(|job| job.owner_id == owner_id && job.status == JobStatus::Running)
            .count();
        Ok(count as i64)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        precondition: &Precondition,
        update: &JobUpdate,
    ) -> Result<Option<Job>> {
        let mut jobs = self.jobs();

        let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
            return Ok(None);
        };

        if !precondition.matches(job) {
            return Ok(None);
        }

        update.apply_to(job);
        Ok(Some(job.clone()))
    }

    async fn list_for_owner(&self, owner_id: i64, filter: &JobFilter) -> Result<(Vec<Job>, i64)> {
        let mut owned: Vec<Job> = self
            .jobs()
            .iter()
            .filter(|job| job.owner_id == owner_id)
            .filter(|job| filter.status.is_none_or(|status| job.status == status))
            .cloned()
            .collect();

        // Newest first; later insertions win ties
        owned.reverse();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn status_counts(&self, owner_id: Option<i64>) -> Result<StatusCounts> {
        let jobs = self.jobs();
        Ok(StatusCounts::from_rows(
            jobs.iter()
                .filter(|job| owner_id.is_none_or(|owner| job.owner_id == owner))
                .map(|job| (job.status, 1)),
        ))
    }

    async fn retry_summary(&self) -> Result<RetrySummary> {
        let jobs = self.jobs();
        Ok(RetrySummary {
            total_retries: jobs.iter().map(|job| i64::from(job.retry_count)).sum(),
            jobs_with_retries: jobs.iter().filter(|job| job.retry_count > 0).count() as i64,
        })
    }

    async fn window_summary(&self, since: DateTime<Utc>) -> Result<WindowSummary> {
        let jobs = self.jobs();
        let recent: Vec<&Job> = jobs.iter().filter(|job| job.created_at >= since).collect();

        Ok(WindowSummary {
            submitted: recent.len() as i64,
            completed: recent
                .iter()
                .filter(|job| matches!(job.status, JobStatus::Done | JobStatus::Dlq))
                .count() as i64,
            failed: recent
                .iter()
                .filter(|job| matches!(job.status, JobStatus::Failed | JobStatus::Dlq))
                .count() as i64,
        })
    }
}
