//! Metrics Service
//!
//! Read-only aggregates computed on demand from the job store. Nothing here
//! runs on the transition path.

use chrono::{Duration, Utc};
use relay_core::dto::metrics::{MetricsSnapshot, OwnerMetrics, SystemMetrics};
use relay_store::{JobStore, StoreError};

/// Builds the metrics snapshot for one owner
pub async fn snapshot(store: &dyn JobStore, owner_id: i64) -> Result<MetricsSnapshot, StoreError> {
    let counts = store.status_counts(None).await?;
    let retries = store.retry_summary().await?;
    let last_24h = store.window_summary(Utc::now() - Duration::hours(24)).await?;
    let owner_counts = store.status_counts(Some(owner_id)).await?;

    Ok(MetricsSnapshot {
        system: SystemMetrics { counts, retries },
        last_24h,
        owner: OwnerMetrics {
            counts: owner_counts,
            concurrent: owner_counts.running,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::job::{Job, JobStatus};
    use relay_store::{IdempotencyScope, MemoryJobStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_separates_system_and_owner() {
        let store = MemoryJobStore::new(IdempotencyScope::Global);

        let mut running = Job::new(1, json!({}), None, 3, Utc::now());
        running.status = JobStatus::Running;
        let mut dead = Job::new(2, json!({}), None, 1, Utc::now());
        dead.status = JobStatus::Dlq;
        dead.retry_count = 2;

        store.insert(&running).await.unwrap();
        store.insert(&dead).await.unwrap();
        store
            .insert(&Job::new(1, json!({}), None, 3, Utc::now()))
            .await
            .unwrap();

        let snapshot = snapshot(&store, 1).await.unwrap();

        assert_eq!(snapshot.system.counts.total, 3);
        assert_eq!(snapshot.system.retries.total_retries, 2);
        assert_eq!(snapshot.system.retries.jobs_with_retries, 1);
        assert_eq!(snapshot.last_24h.submitted, 3);
        assert_eq!(snapshot.last_24h.completed, 1);
        assert_eq!(snapshot.last_24h.failed, 1);
        assert_eq!(snapshot.owner.counts.total, 2);
        assert_eq!(snapshot.owner.concurrent, 1);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["system"]["dlq"], 1);
        assert_eq!(value["owner"]["concurrent"], 1);
    }
}
