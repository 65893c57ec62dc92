//! Repository Module
//!
//! The Job Record Store: durable job CRUD plus one atomic primitive, the
//! conditional update behind every state transition.
//!
//! All access goes through the [`JobStore`] trait so the lease protocol, the
//! worker and the API can run against PostgreSQL in production and against
//! [`MemoryJobStore`] in tests.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::domain::job::{Job, JobStatus};
use relay_core::dto::metrics::{RetrySummary, StatusCounts, WindowSummary};
use relay_core::lifecycle::{JobUpdate, Precondition};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Result;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Repository trait for the job table
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new job
    ///
    /// Fails with `DuplicateIdempotencyKey` when the key is already taken
    /// within the store's [`IdempotencyScope`].
    async fn insert(&self, job: &Job) -> Result<Uuid>;

    /// Finds a job by ID
    async fn find(&self, id: Uuid) -> Result<Option<Job>>;

    /// Finds the owner's job carrying this idempotency key
    async fn find_by_idempotency_key(&self, owner_id: i64, key: &str) -> Result<Option<Job>>;

    /// Pending jobs without a live lease at `now`, oldest first
    async fn list_claimable(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Running jobs whose lease lapsed before `now`
    async fn list_expired_leases(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>>;

    /// Number of the owner's jobs currently running
    async fn count_running_for_owner(&self, owner_id: i64) -> Result<i64>;

    /// Applies `update` in one atomic step if the job still satisfies `precondition`
    ///
    /// # Returns
    /// The updated job, or `None` when the job is missing or the precondition
    /// no longer holds (someone else transitioned it first).
    async fn apply_transition(
        &self,
        id: Uuid,
        precondition: &Precondition,
        update: &JobUpdate,
    ) -> Result<Option<Job>>;

    /// One page of the owner's jobs, newest first, with the unpaged total
    async fn list_for_owner(&self, owner_id: i64, filter: &JobFilter) -> Result<(Vec<Job>, i64)>;

    /// Job counts by status, optionally restricted to one owner
    async fn status_counts(&self, owner_id: Option<i64>) -> Result<StatusCounts>;

    /// Retry totals across all jobs
    async fn retry_summary(&self) -> Result<RetrySummary>;

    /// Activity of jobs created at or after `since`
    async fn window_summary(&self, since: DateTime<Utc>) -> Result<WindowSummary>;
}

/// Filter and paging for owner job listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            offset: 0,
            limit: 20,
        }
    }
}

/// How far idempotency keys must be unique
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdempotencyScope {
    /// One job per key across all owners
    #[default]
    Global,
    /// One job per `(owner, key)` pair
    PerOwner,
}

impl IdempotencyScope {
    /// Whether `existing` already claims the key `owner_id` wants to use
    pub fn collides(&self, existing: &Job, owner_id: i64, key: &str) -> bool {
        existing.idempotency_key.as_deref() == Some(key)
            && match self {
                IdempotencyScope::Global => true,
                IdempotencyScope::PerOwner => existing.owner_id == owner_id,
            }
    }
}

impl fmt::Display for IdempotencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdempotencyScope::Global => write!(f, "global"),
            IdempotencyScope::PerOwner => write!(f, "per-owner"),
        }
    }
}

impl FromStr for IdempotencyScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(IdempotencyScope::Global),
            "per-owner" | "per_owner" | "owner" => Ok(IdempotencyScope::PerOwner),
            other => Err(format!(
                "unknown idempotency scope '{}', expected 'global' or 'per-owner'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_parsing() {
        assert_eq!("global".parse::<IdempotencyScope>(), Ok(IdempotencyScope::Global));
        assert_eq!("Per-Owner".parse::<IdempotencyScope>(), Ok(IdempotencyScope::PerOwner));
        assert_eq!("per_owner".parse::<IdempotencyScope>(), Ok(IdempotencyScope::PerOwner));
        assert!("tenant".parse::<IdempotencyScope>().is_err());
    }

    #[test]
    fn test_scope_collisions() {
        let existing = Job::new(1, json!({}), Some("k1".to_string()), 3, Utc::now());

        assert!(IdempotencyScope::Global.collides(&existing, 1, "k1"));
        assert!(IdempotencyScope::Global.collides(&existing, 2, "k1"));
        assert!(IdempotencyScope::PerOwner.collides(&existing, 1, "k1"));
        assert!(!IdempotencyScope::PerOwner.collides(&existing, 2, "k1"));
        assert!(!IdempotencyScope::Global.collides(&existing, 1, "k2"));
    }
}
