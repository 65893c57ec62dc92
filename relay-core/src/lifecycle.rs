//! Job state machine
//!
//! Pure transition logic. Every function here turns a trigger (and, where the
//! outcome depends on it, a snapshot of the job) into a [`Transition`]: the
//! precondition the stored row must still satisfy plus the field changes to
//! write. Stores apply the pair as one conditional update, so a transition
//! computed from a stale snapshot simply fails to apply.
//!
//! ```text
//! pending --lease--> running --ack--> done
//!                    running --fail--> pending   (retries left)
//!                    running --fail--> dlq       (budget exhausted)
//!                    running --lease expired--> pending
//! ```

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Lease,
    Ack,
    Fail,
    LeaseExpired,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Lease => write!(f, "lease"),
            Trigger::Ack => write!(f, "ack"),
            Trigger::Fail => write!(f, "fail"),
            Trigger::LeaseExpired => write!(f, "lease_expired"),
        }
    }
}

/// Lease-related part of a precondition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseCheck {
    /// No lease, or a lease that expired before the given instant
    FreeAt(DateTime<Utc>),
    /// A lease exists and expired before the given instant
    ExpiredBefore(DateTime<Utc>),
    /// The exact lease granted to `holder`
    ///
    /// Matching the expiry as well as the holder tells two leases granted to
    /// the same worker apart, so a report from an attempt whose lease was
    /// reaped cannot land on a later attempt.
    HeldBy {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

/// Condition the stored job must satisfy for a transition to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub status: JobStatus,
    pub lease: LeaseCheck,
}

impl Precondition {
    pub fn matches(&self, job: &Job) -> bool {
        if job.status != self.status {
            return false;
        }

        match &self.lease {
            LeaseCheck::FreeAt(now) => job.lease_is_free(*now),
            LeaseCheck::ExpiredBefore(now) => job.lease_expires_at.is_some_and(|at| at < *now),
            LeaseCheck::HeldBy { holder, expires_at } => {
                job.lease_holder.as_deref() == Some(holder.as_str())
                    && job.lease_expires_at == Some(*expires_at)
            }
        }
    }
}

/// New value of the lease columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseChange {
    Grant {
        holder: String,
        expires_at: DateTime<Utc>,
    },
    Clear,
}

/// Field changes written by a transition
///
/// `status` and the lease columns are always written. The remaining fields
/// are only written when `Some`; `None` leaves the stored value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub lease: LeaseChange,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: Option<i32>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn apply_to(&self, job: &mut Job) {
        job.status = self.status;

        match &self.lease {
            LeaseChange::Grant { holder, expires_at } => {
                job.lease_holder = Some(holder.clone());
                job.lease_expires_at = Some(*expires_at);
            }
            LeaseChange::Clear => {
                job.lease_holder = None;
                job.lease_expires_at = None;
            }
        }

        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            job.completed_at = Some(completed_at);
        }
        if let Some(retry_count) = self.retry_count {
            job.retry_count = retry_count;
        }
        if let Some(message) = &self.error_message {
            job.error_message = Some(message.clone());
        }
    }
}

/// A precondition/update pair ready to be applied atomically
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub trigger: Trigger,
    pub precondition: Precondition,
    pub update: JobUpdate,
}

impl Transition {
    /// Applies the transition to an in-memory job if the precondition holds
    ///
    /// Returns `false` and leaves the job untouched otherwise.
    pub fn apply(&self, job: &mut Job) -> bool {
        if !self.precondition.matches(job) {
            return false;
        }
        self.update.apply_to(job);
        true
    }
}

/// A transition requested from a state that does not admit it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id}: cannot {trigger} from status {from}")]
    NotAllowed {
        job_id: Uuid,
        from: JobStatus,
        trigger: Trigger,
    },

    #[error("job {job_id}: lease is held by {holder:?}, not {worker_id}")]
    NotLeaseHolder {
        job_id: Uuid,
        holder: Option<String>,
        worker_id: String,
    },

    #[error("job {job_id}: lease has not expired yet")]
    LeaseStillActive { job_id: Uuid },
}

/// pending -> running
///
/// Needs no snapshot: the precondition alone decides whether the claim wins.
pub fn lease(worker_id: &str, ttl: Duration, now: DateTime<Utc>) -> Transition {
    Transition {
        trigger: Trigger::Lease,
        precondition: Precondition {
            status: JobStatus::Pending,
            lease: LeaseCheck::FreeAt(now),
        },
        update: JobUpdate {
            status: JobStatus::Running,
            lease: LeaseChange::Grant {
                holder: worker_id.to_string(),
                expires_at: now + ttl,
            },
            started_at: Some(now),
            completed_at: None,
            retry_count: None,
            error_message: None,
        },
    }
}

/// running -> done
///
/// `job` is the snapshot returned when the lease was granted; the transition
/// only applies while that same lease is still in place.
pub fn ack(job: &Job, worker_id: &str, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
    let precondition = held_by(job, worker_id, Trigger::Ack)?;

    Ok(Transition {
        trigger: Trigger::Ack,
        precondition,
        update: JobUpdate {
            status: JobStatus::Done,
            lease: LeaseChange::Clear,
            started_at: None,
            completed_at: Some(now),
            retry_count: None,
            error_message: None,
        },
    })
}

/// running -> pending while retries remain, running -> dlq once exhausted
///
/// Like [`ack`], fenced on the lease recorded in `job`.
pub fn fail(
    job: &Job,
    worker_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    let precondition = held_by(job, worker_id, Trigger::Fail)?;

    let retry_count = job.retry_count + 1;
    let exhausted = retry_count > job.max_retries;

    Ok(Transition {
        trigger: Trigger::Fail,
        precondition,
        update: JobUpdate {
            status: if exhausted {
                JobStatus::Dlq
            } else {
                JobStatus::Pending
            },
            lease: LeaseChange::Clear,
            started_at: None,
            completed_at: exhausted.then_some(now),
            retry_count: Some(retry_count),
            error_message: Some(message.to_string()),
        },
    })
}

/// running -> pending after the lease lapsed without a report
///
/// Not a failure: `retry_count` is left alone.
pub fn expire(job: &Job, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
    if job.status != JobStatus::Running {
        return Err(TransitionError::NotAllowed {
            job_id: job.id,
            from: job.status,
            trigger: Trigger::LeaseExpired,
        });
    }
    if !job.lease_expired(now) {
        return Err(TransitionError::LeaseStillActive { job_id: job.id });
    }

    Ok(Transition {
        trigger: Trigger::LeaseExpired,
        precondition: Precondition {
            status: JobStatus::Running,
            lease: LeaseCheck::ExpiredBefore(now),
        },
        update: JobUpdate {
            status: JobStatus::Pending,
            lease: LeaseChange::Clear,
            started_at: None,
            completed_at: None,
            retry_count: None,
            error_message: None,
        },
    })
}

/// Precondition pinning the lease `worker_id` holds in `job`
fn held_by(job: &Job, worker_id: &str, trigger: Trigger) -> Result<Precondition, TransitionError> {
    if job.status != JobStatus::Running {
        return Err(TransitionError::NotAllowed {
            job_id: job.id,
            from: job.status,
            trigger,
        });
    }

    match (job.lease_holder.as_deref(), job.lease_expires_at) {
        (Some(holder), Some(expires_at)) if holder == worker_id => Ok(Precondition {
            status: JobStatus::Running,
            lease: LeaseCheck::HeldBy {
                holder: worker_id.to_string(),
                expires_at,
            },
        }),
        _ => Err(TransitionError::NotLeaseHolder {
            job_id: job.id,
            holder: job.lease_holder.clone(),
            worker_id: worker_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WORKER: &str = "worker-1";

    fn pending_job(max_retries: i32) -> Job {
        Job::new(1, json!({"kind": "fail"}), None, max_retries, Utc::now())
    }

    fn leased(job: &mut Job, now: DateTime<Utc>) {
        assert!(lease(WORKER, Duration::seconds(30), now).apply(job));
    }

    #[test]
    fn test_lease_sets_lease_fields() {
        let now = Utc::now();
        let mut job = pending_job(3);

        leased(&mut job, now);

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.lease_holder.as_deref(), Some(WORKER));
        assert_eq!(job.lease_expires_at, Some(now + Duration::seconds(30)));
        assert_eq!(job.started_at, Some(now));
    }

    #[test]
    fn test_lease_rejected_while_running() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);

        let second = lease("worker-2", Duration::seconds(30), now);
        assert!(!second.apply(&mut job));
        assert_eq!(job.lease_holder.as_deref(), Some(WORKER));
    }

    #[test]
    fn test_lease_rejected_on_unexpired_pending_lease() {
        let now = Utc::now();
        let mut job = pending_job(3);
        job.lease_expires_at = Some(now + Duration::seconds(5));

        assert!(!lease(WORKER, Duration::seconds(30), now).apply(&mut job));
        assert!(lease(WORKER, Duration::seconds(30), now + Duration::seconds(6)).apply(&mut job));
    }

    #[test]
    fn test_ack_completes_and_clears_lease() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);

        let transition = ack(&job, WORKER, now).unwrap();
        assert!(transition.apply(&mut job));

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.completed_at, Some(now));
        assert!(job.lease_holder.is_none());
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn test_ack_requires_running() {
        let job = pending_job(3);
        let err = ack(&job, WORKER, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::NotAllowed {
                from: JobStatus::Pending,
                trigger: Trigger::Ack,
                ..
            }
        ));
    }

    #[test]
    fn test_ack_requires_lease_holder() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);

        let err = ack(&job, "worker-2", now).unwrap_err();
        assert!(matches!(err, TransitionError::NotLeaseHolder { .. }));
    }

    #[test]
    fn test_fail_requeues_while_budget_remains() {
        let now = Utc::now();
        let mut job = pending_job(2);
        leased(&mut job, now);

        assert!(fail(&job, WORKER, "boom", now).unwrap().apply(&mut job));

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert!(job.completed_at.is_none());
        assert!(job.lease_holder.is_none());
    }

    #[test]
    fn test_fail_cycles_end_in_dlq() {
        let mut job = pending_job(2);

        for _ in 0..3 {
            let now = Utc::now();
            leased(&mut job, now);
            assert!(fail(&job, WORKER, "boom", now).unwrap().apply(&mut job));
        }

        assert_eq!(job.retry_count, 3);
        assert_eq!(job.status, JobStatus::Dlq);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert!(job.completed_at.is_some());
        assert!(job.lease_holder.is_none());
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn test_retry_count_matches_failures_for_any_budget() {
        for max_retries in 0..5 {
            let mut job = pending_job(max_retries);
            let mut failures = 0;

            while !job.status.is_terminal() {
                let now = Utc::now();
                leased(&mut job, now);
                assert!(fail(&job, WORKER, "x", now).unwrap().apply(&mut job));
                failures += 1;
                assert_eq!(job.retry_count, failures);
                assert_eq!(job.status == JobStatus::Dlq, job.retry_count > job.max_retries);
            }

            assert_eq!(failures, max_retries + 1);
        }
    }

    #[test]
    fn test_fail_from_terminal_is_rejected() {
        let now = Utc::now();
        let mut job = pending_job(0);
        leased(&mut job, now);
        assert!(ack(&job, WORKER, now).unwrap().apply(&mut job));

        assert!(fail(&job, WORKER, "late", now).is_err());
    }

    #[test]
    fn test_expire_returns_to_pending_without_retry() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);

        let later = now + Duration::seconds(31);
        assert!(expire(&job, later).unwrap().apply(&mut job));

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.lease_holder.is_none());
        assert!(job.lease_expires_at.is_none());
        assert!(job.is_claimable(later));
    }

    #[test]
    fn test_expire_rejects_live_lease() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);

        let err = expire(&job, now + Duration::seconds(1)).unwrap_err();
        assert_eq!(err, TransitionError::LeaseStillActive { job_id: job.id });
    }

    #[test]
    fn test_stale_report_does_not_apply_after_release() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);
        let stale_ack = ack(&job, WORKER, now).unwrap();

        let later = now + Duration::seconds(31);
        assert!(expire(&job, later).unwrap().apply(&mut job));
        assert!(lease("worker-2", Duration::seconds(30), later).apply(&mut job));

        assert!(!stale_ack.apply(&mut job));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.lease_holder.as_deref(), Some("worker-2"));
    }

    #[test]
    fn test_stale_report_does_not_reach_later_lease_of_same_worker() {
        let now = Utc::now();
        let mut job = pending_job(3);
        leased(&mut job, now);
        let first_attempt = job.clone();

        let later = now + Duration::seconds(31);
        assert!(expire(&job, later).unwrap().apply(&mut job));
        leased(&mut job, later);
        assert_eq!(job.lease_holder.as_deref(), Some(WORKER));

        let stale_ack = ack(&first_attempt, WORKER, later).unwrap();
        let stale_fail = fail(&first_attempt, WORKER, "late", later).unwrap();
        assert!(!stale_ack.apply(&mut job));
        assert!(!stale_fail.apply(&mut job));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.retry_count, 0);

        // The current attempt still reports normally
        assert!(ack(&job, WORKER, later).unwrap().apply(&mut job));
        assert_eq!(job.status, JobStatus::Done);
    }
}
