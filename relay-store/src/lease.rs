//! Lease Manager
//!
//! The claim protocol on top of [`JobLifecycle`]. A claim is one conditional
//! update on `(status = pending AND lease free)`, never a read followed by a
//! write, so concurrent claimers on the same job see exactly one winner.

use chrono::{DateTime, Utc};
use relay_core::domain::job::Job;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreError;
use crate::lifecycle::{JobLifecycle, LifecycleError};

/// Upper bound on how far a lease may reach into the future
const MAX_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct LeaseManager {
    lifecycle: Arc<JobLifecycle>,
}

impl LeaseManager {
    pub fn new(lifecycle: Arc<JobLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Arc<JobLifecycle> {
        &self.lifecycle
    }

    /// Claims a pending job for `worker_id`
    ///
    /// # Arguments
    /// * `job_id` - Job to claim
    /// * `worker_id` - Identity recorded as the lease holder
    /// * `ttl` - How long the lease stays valid without a report
    ///
    /// # Returns
    /// The running job on success, `None` if another claimer got there first
    /// or the job is no longer pending.
    pub async fn acquire(
        &self,
        job_id: Uuid,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<Option<Job>, StoreError> {
        self.acquire_at(job_id, worker_id, ttl, Utc::now()).await
    }

    pub async fn acquire_at(
        &self,
        job_id: Uuid,
        worker_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or(chrono::Duration::MAX);
        self.lifecycle.lease(job_id, worker_id, ttl, now).await
    }

    /// Returns running jobs with lapsed leases to pending
    ///
    /// # Returns
    /// Number of jobs reclaimed. Jobs that were acknowledged, failed or
    /// reclaimed by someone else in the meantime are skipped.
    pub async fn reap_expired(&self, limit: usize) -> Result<usize, StoreError> {
        self.reap_expired_at(limit, Utc::now()).await
    }

    pub async fn reap_expired_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let expired = self
            .lifecycle
            .store()
            .list_expired_leases(limit, now)
            .await?;

        let mut reclaimed = 0;
        for job in expired {
            match self.lifecycle.expire(&job, now).await {
                Ok(_) => {
                    tracing::warn!(
                        job_id = %job.id,
                        trace_id = %job.trace_id,
                        "Reclaimed job after lease held by {} expired",
                        job.lease_holder.as_deref().unwrap_or("unknown")
                    );
                    reclaimed += 1;
                }
                Err(LifecycleError::Store(e)) => return Err(e),
                Err(e) => {
                    tracing::debug!(job_id = %job.id, "Skipped reclaim: {}", e);
                }
            }
        }

        Ok(reclaimed)
    }
}
