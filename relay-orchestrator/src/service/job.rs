//! Job Service
//!
//! Business logic for submission and owner-scoped queries.

use chrono::Utc;
use relay_core::domain::job::{Job, JobStatus};
use relay_core::dto::job::{JobPage, JobView, ListJobsQuery, Pagination, SubmitJob};
use relay_store::{JobFilter, JobLifecycle, JobStore, StoreError};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    Validation(Vec<String>),
    NotFound(Uuid),
    Conflict(String),
    Database(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::Database(err)
    }
}

/// Outcome of a submission
#[derive(Debug)]
pub struct Submission {
    pub job: Job,
    /// `false` when an existing job was returned for the idempotency key
    pub created: bool,
}

/// A submission that passed validation
#[derive(Debug, PartialEq)]
struct ValidSubmission {
    payload: Value,
    idempotency_key: Option<String>,
    max_retries: i32,
}

/// Submit a job, or return the existing one for a repeated idempotency key
pub async fn submit_job(
    lifecycle: &JobLifecycle,
    owner_id: i64,
    req: SubmitJob,
    default_max_retries: i32,
) -> Result<Submission, JobError> {
    let valid = validate_submission(req, default_max_retries)?;
    let store = lifecycle.store();

    if let Some(key) = valid.idempotency_key.as_deref() {
        if let Some(existing) = store.find_by_idempotency_key(owner_id, key).await? {
            tracing::debug!("Idempotent replay of job {} for key {}", existing.id, key);
            return Ok(Submission {
                job: existing,
                created: false,
            });
        }
    }

    let job = Job::new(
        owner_id,
        valid.payload,
        valid.idempotency_key.clone(),
        valid.max_retries,
        Utc::now(),
    );

    match lifecycle.submit(job).await {
        Ok(job) => {
            tracing::info!(
                job_id = %job.id,
                trace_id = %job.trace_id,
                "Job submitted by owner {}",
                owner_id
            );
            Ok(Submission { job, created: true })
        }
        Err(StoreError::DuplicateIdempotencyKey(key)) => {
            // Lost a race against a concurrent submission, or the key belongs
            // to another owner under global uniqueness
            match store.find_by_idempotency_key(owner_id, &key).await? {
                Some(existing) => Ok(Submission {
                    job: existing,
                    created: false,
                }),
                None => Err(JobError::Conflict(format!(
                    "Idempotency key '{}' is already in use",
                    key
                ))),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Get one of the owner's jobs; other owners' jobs are reported as missing
pub async fn get_job(store: &dyn JobStore, owner_id: i64, id: Uuid) -> Result<Job, JobError> {
    store
        .find(id)
        .await?
        .filter(|job| job.owner_id == owner_id)
        .ok_or(JobError::NotFound(id))
}

/// List the owner's jobs, newest first
pub async fn list_jobs(
    store: &dyn JobStore,
    owner_id: i64,
    query: ListJobsQuery,
) -> Result<JobPage, JobError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<JobStatus>().map_err(|_| {
            JobError::Validation(vec![format!(
                "Status must be one of: {}",
                JobStatus::ALL.map(|s| s.as_str()).join(", ")
            )])
        })?),
    };

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let filter = JobFilter {
        status,
        offset: i64::from(page - 1) * i64::from(per_page),
        limit: i64::from(per_page),
    };
    let (jobs, total) = store.list_for_owner(owner_id, &filter).await?;

    Ok(JobPage {
        jobs: jobs.into_iter().map(JobView::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Collects every problem with a submission instead of stopping at the first
fn validate_submission(req: SubmitJob, default_max_retries: i32) -> Result<ValidSubmission, JobError> {
    let mut errors = Vec::new();

    let payload = match req.payload {
        None | Some(Value::Null) => None,
        Some(Value::Object(fields)) if fields.is_empty() => None,
        Some(payload) => Some(payload),
    };
    if payload.is_none() {
        errors.push("Payload can't be blank".to_string());
    }

    let max_retries = match req.max_retries {
        None | Some(Value::Null) => Some(default_max_retries),
        Some(value) => parse_max_retries(&value),
    };
    if max_retries.is_none() {
        errors.push("Max retries must be a non-negative integer".to_string());
    }

    match (payload, max_retries) {
        (Some(payload), Some(max_retries)) => Ok(ValidSubmission {
            payload,
            idempotency_key: req
                .idempotency_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            max_retries,
        }),
        _ => Err(JobError::Validation(errors)),
    }
}

/// Accepts integers and integer strings, like a form field would be
fn parse_max_retries(value: &Value) -> Option<i32> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    i32::try_from(n).ok().filter(|n| *n >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use relay_core::dto::metrics::{RetrySummary, StatusCounts, WindowSummary};
    use relay_core::lifecycle::{JobUpdate, Precondition};
    use relay_store::error::Result as StoreResult;
    use relay_store::{BroadcastNotifier, IdempotencyScope, MemoryJobStore};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Misses the first idempotency lookup, as if a concurrent submission
    /// committed the key right after it
    struct LateWinnerStore {
        inner: MemoryJobStore,
        missed: AtomicBool,
    }

    #[async_trait]
    impl JobStore for LateWinnerStore {
        async fn insert(&self, job: &Job) -> StoreResult<Uuid> {
            self.inner.insert(job).await
        }

        async fn find(&self, id: Uuid) -> StoreResult<Option<Job>> {
            self.inner.find(id).await
        }

        async fn find_by_idempotency_key(&self, owner_id: i64, key: &str) -> StoreResult<Option<Job>> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_idempotency_key(owner_id, key).await
        }

        async fn list_claimable(&self, limit: usize, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
            self.inner.list_claimable(limit, now).await
        }

        async fn list_expired_leases(&self, limit: usize, now: DateTime<Utc>) -> StoreResult<Vec<Job>> {
            self.inner.list_expired_leases(limit, now).await
        }

        async fn count_running_for_owner(&self, owner_id: i64) -> StoreResult<i64> {
            self.inner.count_running_for_owner(owner_id).await
        }

        async fn apply_transition(
            &self,
            id: Uuid,
            precondition: &Precondition,
            update: &JobUpdate,
        ) -> StoreResult<Option<Job>> {
            self.inner.apply_transition(id, precondition, update).await
        }

        async fn list_for_owner(&self, owner_id: i64, filter: &JobFilter) -> StoreResult<(Vec<Job>, i64)> {
            self.inner.list_for_owner(owner_id, filter).await
        }

        async fn status_counts(&self, owner_id: Option<i64>) -> StoreResult<StatusCounts> {
            self.inner.status_counts(owner_id).await
        }

        async fn retry_summary(&self) -> StoreResult<RetrySummary> {
            self.inner.retry_summary().await
        }

        async fn window_summary(&self, since: DateTime<Utc>) -> StoreResult<WindowSummary> {
            self.inner.window_summary(since).await
        }
    }

    fn lifecycle(scope: IdempotencyScope) -> JobLifecycle {
        JobLifecycle::new(
            MemoryJobStore::arc(scope),
            Arc::new(BroadcastNotifier::new(16)),
        )
    }

    fn request(payload: Value, key: Option<&str>) -> SubmitJob {
        SubmitJob {
            payload: Some(payload),
            idempotency_key: key.map(String::from),
            max_retries: None,
        }
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let req = SubmitJob {
            payload: Some(json!({})),
            idempotency_key: None,
            max_retries: Some(json!("many")),
        };

        match validate_submission(req, 3) {
            Err(JobError::Validation(errors)) => assert_eq!(
                errors,
                vec![
                    "Payload can't be blank".to_string(),
                    "Max retries must be a non-negative integer".to_string(),
                ]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_accepts_numeric_strings() {
        let req = SubmitJob {
            payload: Some(json!({"kind": "sleep"})),
            idempotency_key: Some("  ".to_string()),
            max_retries: Some(json!("5")),
        };

        let valid = validate_submission(req, 3).unwrap();
        assert_eq!(valid.max_retries, 5);
        assert_eq!(valid.idempotency_key, None);
    }

    #[test]
    fn test_parse_max_retries() {
        assert_eq!(parse_max_retries(&json!(0)), Some(0));
        assert_eq!(parse_max_retries(&json!(-1)), None);
        assert_eq!(parse_max_retries(&json!(1.5)), None);
        assert_eq!(parse_max_retries(&json!(true)), None);
        assert_eq!(parse_max_retries(&json!(" 7 ")), Some(7));
    }

    #[tokio::test]
    async fn test_submit_uses_default_retries() {
        let lifecycle = lifecycle(IdempotencyScope::Global);
        let submission = submit_job(&lifecycle, 1, request(json!({"kind": "sleep"}), None), 3)
            .await
            .unwrap();

        assert!(submission.created);
        assert_eq!(submission.job.status, JobStatus::Pending);
        assert_eq!(submission.job.max_retries, 3);
        assert_eq!(submission.job.retry_count, 0);
        assert!(submission.job.idempotency_key.is_none());
    }

    #[tokio::test]
    async fn test_repeated_key_returns_existing_job() {
        let lifecycle = lifecycle(IdempotencyScope::Global);

        let first = submit_job(&lifecycle, 1, request(json!({"n": 1}), Some("k1")), 3)
            .await
            .unwrap();
        let second = submit_job(&lifecycle, 1, request(json!({"n": 2}), Some("k1")), 3)
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.job.id, first.job.id);
        assert_eq!(second.job.payload, json!({"n": 1}));
        assert_eq!(lifecycle.store().status_counts(None).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_key_committed_after_lookup_returns_winner() {
        let store = LateWinnerStore {
            inner: MemoryJobStore::new(IdempotencyScope::Global),
            missed: AtomicBool::new(false),
        };
        let winner = Job::new(1, json!({"n": 1}), Some("k1".to_string()), 3, Utc::now());
        store.inner.insert(&winner).await.unwrap();
        let lifecycle = JobLifecycle::new(Arc::new(store), Arc::new(BroadcastNotifier::new(16)));

        let submission = submit_job(&lifecycle, 1, request(json!({"n": 2}), Some("k1")), 3)
            .await
            .unwrap();

        assert!(!submission.created);
        assert_eq!(submission.job.id, winner.id);
        assert_eq!(submission.job.payload, json!({"n": 1}));
        assert_eq!(lifecycle.store().status_counts(None).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_key_reuse_by_other_owner_depends_on_scope() {
        let global = lifecycle(IdempotencyScope::Global);
        submit_job(&global, 1, request(json!({"n": 1}), Some("k1")), 3)
            .await
            .unwrap();
        let err = submit_job(&global, 2, request(json!({"n": 1}), Some("k1")), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Conflict(_)));

        let per_owner = lifecycle(IdempotencyScope::PerOwner);
        let a = submit_job(&per_owner, 1, request(json!({"n": 1}), Some("k1")), 3)
            .await
            .unwrap();
        let b = submit_job(&per_owner, 2, request(json!({"n": 1}), Some("k1")), 3)
            .await
            .unwrap();
        assert!(b.created);
        assert_ne!(a.job.id, b.job.id);
    }

    #[tokio::test]
    async fn test_get_job_hides_other_owners() {
        let lifecycle = lifecycle(IdempotencyScope::Global);
        let job = submit_job(&lifecycle, 1, request(json!({"n": 1}), None), 3)
            .await
            .unwrap()
            .job;

        let store = lifecycle.store().as_ref();
        assert_eq!(get_job(store, 1, job.id).await.unwrap().id, job.id);
        assert!(matches!(
            get_job(store, 2, job.id).await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_jobs_paginates_and_filters() {
        let lifecycle = lifecycle(IdempotencyScope::Global);
        for n in 0..3 {
            submit_job(&lifecycle, 1, request(json!({ "n": n }), None), 3)
                .await
                .unwrap();
        }
        let store = lifecycle.store().as_ref();

        let page = list_jobs(
            store,
            1,
            ListJobsQuery {
                status: Some("pending".to_string()),
                page: Some(2),
                per_page: Some(2),
            },
        )
        .await
        .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 2,
                per_page: 2,
                total: 3,
                total_pages: 2
            }
        );

        let clamped = list_jobs(
            store,
            1,
            ListJobsQuery {
                per_page: Some(1000),
                ..ListJobsQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(clamped.pagination.per_page, MAX_PER_PAGE);
        assert_eq!(clamped.pagination.page, 1);

        let bad = list_jobs(
            store,
            1,
            ListJobsQuery {
                status: Some("exploded".to_string()),
                ..ListJobsQuery::default()
            },
        )
        .await;
        assert!(matches!(bad, Err(JobError::Validation(_))));
    }
}
