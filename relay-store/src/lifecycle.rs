//! Applied job state machine
//!
//! Bridges the pure transitions in `relay_core::lifecycle` to a `JobStore`:
//! computes the transition, applies it as one conditional update, and emits
//! a change notification once it has been persisted.

use chrono::{DateTime, Duration, Utc};
use relay_core::domain::event::JobEvent;
use relay_core::domain::job::Job;
use relay_core::lifecycle::{self, Transition, TransitionError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::StoreError;
use crate::notify::Notifier;
use crate::repository::JobStore;

/// Errors raised while applying a transition
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// The stored job changed between the read and the conditional write.
    /// Expected under concurrency; re-read and decide instead of retrying.
    #[error("job {0} was transitioned concurrently")]
    Conflict(Uuid),

    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Persists a freshly created job and announces it
    pub async fn submit(&self, job: Job) -> Result<Job, StoreError> {
        self.store.insert(&job).await?;
        self.notifier.notify(JobEvent::for_job(&job, job.created_at));
        Ok(job)
    }

    /// pending -> running, as a single conditional update with no prior read
    ///
    /// # Returns
    /// The leased job, or `None` when the job was not claimable (already
    /// leased, not pending, or gone).
    pub async fn lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let transition = lifecycle::lease(worker_id, ttl, now);
        let leased = self
            .store
            .apply_transition(job_id, &transition.precondition, &transition.update)
            .await?;

        if let Some(job) = &leased {
            self.notifier.notify(JobEvent::for_job(job, now));
        }
        Ok(leased)
    }

    /// running -> done
    ///
    /// `leased` is the job as returned by [`lease`](Self::lease). If that
    /// lease has since been reaped the report is refused with `Conflict`,
    /// even when the job was leased again by the same worker.
    pub async fn ack(
        &self,
        leased: &Job,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, LifecycleError> {
        let transition = lifecycle::ack(leased, worker_id, now)?;
        self.commit(leased.id, transition, now).await
    }

    /// running -> pending or dlq, depending on the remaining retry budget
    ///
    /// Fenced on the lease in `leased`, like [`ack`](Self::ack).
    pub async fn fail(
        &self,
        leased: &Job,
        worker_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, LifecycleError> {
        let transition = lifecycle::fail(leased, worker_id, message, now)?;
        self.commit(leased.id, transition, now).await
    }

    /// running -> pending for a job whose lease lapsed
    pub async fn expire(&self, job: &Job, now: DateTime<Utc>) -> Result<Job, LifecycleError> {
        let transition = lifecycle::expire(job, now)?;
        self.commit(job.id, transition, now).await
    }

    async fn commit(
        &self,
        job_id: Uuid,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Job, LifecycleError> {
        let applied = self
            .store
            .apply_transition(job_id, &transition.precondition, &transition.update)
            .await?;

        let Some(job) = applied else {
            return Err(match self.store.find(job_id).await? {
                Some(_) => LifecycleError::Conflict(job_id),
                None => LifecycleError::NotFound(job_id),
            });
        };

        tracing::debug!(
            job_id = %job.id,
            trace_id = %job.trace_id,
            "Applied {} transition, job is now {}",
            transition.trigger,
            job.status
        );

        self.notifier.notify(JobEvent::for_job(&job, now));
        Ok(job)
    }
}
