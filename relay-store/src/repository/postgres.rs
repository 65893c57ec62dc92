//! PostgreSQL job store
//!
//! Every transition is a single `UPDATE ... WHERE <precondition> RETURNING`,
//! so the check and the write can never be separated by another writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::domain::job::{Job, JobStatus};
use relay_core::dto::metrics::{RetrySummary, StatusCounts, WindowSummary};
use relay_core::lifecycle::{JobUpdate, LeaseChange, LeaseCheck, Precondition};
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobFilter, JobStore};
use crate::error::{Result, StoreError};

const JOB_COLUMNS: &str = "id, owner_id, status, payload, idempotency_key, retry_count, \
     max_retries, lease_holder, lease_expires_at, error_message, trace_id, started_at, \
     completed_at, created_at";

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<Uuid> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, owner_id, status, payload, idempotency_key, retry_count,
                              max_retries, trace_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(job.id)
        .bind(job.owner_id)
        .bind(job.status.as_str())
        .bind(&job.payload)
        .bind(job.idempotency_key.as_deref())
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.trace_id)
        .bind(job.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(job.id),
            Err(err) if is_idempotency_violation(&err) => Err(StoreError::DuplicateIdempotencyKey(
                job.idempotency_key.clone().unwrap_or_default(),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_idempotency_key(&self, owner_id: i64, key: &str) -> Result<Option<Job>> {
        let sql =
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE owner_id = $1 AND idempotency_key = $2");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list_claimable(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'pending'
              AND (lease_expires_at IS NULL OR lease_expires_at < $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list_expired_leases(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'running'
              AND lease_expires_at < $1
            ORDER BY lease_expires_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_running_for_owner(&self, owner_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs WHERE owner_id = $1 AND status = 'running'",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        precondition: &Precondition,
        update: &JobUpdate,
    ) -> Result<Option<Job>> {
        let (lease_holder, lease_expires_at) = match &update.lease {
            LeaseChange::Grant { holder, expires_at } => (Some(holder.as_str()), Some(*expires_at)),
            LeaseChange::Clear => (None, None),
        };

        let lease_clause = match &precondition.lease {
            LeaseCheck::FreeAt(_) => "(lease_expires_at IS NULL OR lease_expires_at < $11)",
            LeaseCheck::ExpiredBefore(_) => {
                "(lease_expires_at IS NOT NULL AND lease_expires_at < $11)"
            }
            // Compared against the expiry this table returned when granting
            // the lease, so both sides carry the same microsecond precision
            LeaseCheck::HeldBy { .. } => "(lease_holder = $11 AND lease_expires_at = $12)",
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = $2,
                lease_holder = $3,
                lease_expires_at = $4,
                started_at = COALESCE($5, started_at),
                completed_at = COALESCE($6, completed_at),
                retry_count = COALESCE($7, retry_count),
                error_message = COALESCE($8, error_message),
                updated_at = $9
            WHERE id = $1 AND status = $10 AND {lease_clause}
            RETURNING {JOB_COLUMNS}
            "#
        );

        let query = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .bind(update.status.as_str())
            .bind(lease_holder)
            .bind(lease_expires_at)
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(update.retry_count)
            .bind(update.error_message.as_deref())
            .bind(Utc::now())
            .bind(precondition.status.as_str());

        let query = match &precondition.lease {
            LeaseCheck::FreeAt(at) | LeaseCheck::ExpiredBefore(at) => query.bind(*at),
            LeaseCheck::HeldBy { holder, expires_at } => {
                query.bind(holder.as_str()).bind(*expires_at)
            }
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.map(Job::try_from).transpose()
    }

    async fn list_for_owner(&self, owner_id: i64, filter: &JobFilter) -> Result<(Vec<Job>, i64)> {
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE owner_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            "#,
        )
        .bind(owner_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE owner_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY created_at DESC
            OFFSET $3
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(owner_id)
            .bind(status)
            .bind(filter.offset)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;

        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((jobs, total))
    }

    async fn status_counts(&self, owner_id: Option<i64>) -> Result<StatusCounts> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*) FROM jobs
            WHERE ($1::BIGINT IS NULL OR owner_id = $1)
            GROUP BY status
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .into_iter()
            .map(|(status, count)| Ok((parse_status(&status)?, count)))
            .collect::<Result<Vec<_>>>()?;

        Ok(StatusCounts::from_rows(rows))
    }

    async fn retry_summary(&self) -> Result<RetrySummary> {
        let (total_retries, jobs_with_retries) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM(retry_count), 0)::BIGINT,
                   COUNT(*) FILTER (WHERE retry_count > 0)
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RetrySummary {
            total_retries,
            jobs_with_retries,
        })
    }

    async fn window_summary(&self, since: DateTime<Utc>) -> Result<WindowSummary> {
        let (submitted, completed, failed) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('done', 'dlq')),
                   COUNT(*) FILTER (WHERE status IN ('failed', 'dlq'))
            FROM jobs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(WindowSummary {
            submitted,
            completed,
            failed,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn is_idempotency_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                && db_err
                    .constraint()
                    .is_some_and(|name| name.starts_with("idx_jobs_idempotency"))
        }
        _ => false,
    }
}

fn parse_status(s: &str) -> Result<JobStatus> {
    s.parse()
        .map_err(|e| StoreError::Corrupt(format!("{}", e)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner_id: i64,
    status: String,
    payload: serde_json::Value,
    idempotency_key: Option<String>,
    retry_count: i32,
    max_retries: i32,
    lease_holder: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    trace_id: Uuid,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Job {
            id: row.id,
            owner_id: row.owner_id,
            status: parse_status(&row.status)?,
            payload: row.payload,
            idempotency_key: row.idempotency_key,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            lease_holder: row.lease_holder,
            lease_expires_at: row.lease_expires_at,
            error_message: row.error_message,
            trace_id: row.trace_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}
