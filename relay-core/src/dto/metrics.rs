//! Metrics read-model DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// Number of jobs in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
    pub dlq: i64,
}

impl StatusCounts {
    /// Builds counts from `(status, count)` rows, e.g. a `GROUP BY status` result
    pub fn from_rows(rows: impl IntoIterator<Item = (JobStatus, i64)>) -> Self {
        let mut counts = Self::default();
        for (status, count) in rows {
            counts.add(status, count);
        }
        counts
    }

    pub fn add(&mut self, status: JobStatus, count: i64) {
        self.total += count;
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Done => self.done += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Dlq => self.dlq += count,
        }
    }
}

/// Retry totals across all jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    pub total_retries: i64,
    pub jobs_with_retries: i64,
}

/// Activity of jobs created inside a trailing window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub submitted: i64,
    /// Jobs in `done` or `dlq`
    pub completed: i64,
    /// Jobs in `failed` or `dlq`
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(flatten)]
    pub counts: StatusCounts,
    #[serde(flatten)]
    pub retries: RetrySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerMetrics {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub concurrent: i64,
}

/// Response of `GET /api/metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub last_24h: WindowSummary,
    pub owner: OwnerMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_counts_from_rows() {
        let counts = StatusCounts::from_rows([
            (JobStatus::Pending, 4),
            (JobStatus::Running, 2),
            (JobStatus::Dlq, 1),
        ]);

        assert_eq!(counts.total, 7);
        assert_eq!(counts.pending, 4);
        assert_eq!(counts.running, 2);
        assert_eq!(counts.done, 0);
        assert_eq!(counts.dlq, 1);
    }

    #[test]
    fn test_system_metrics_flatten() {
        let metrics = SystemMetrics {
            counts: StatusCounts::from_rows([(JobStatus::Done, 3)]),
            retries: RetrySummary {
                total_retries: 5,
                jobs_with_retries: 2,
            },
        };

        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["done"], 3);
        assert_eq!(value["total"], 3);
        assert_eq!(value["total_retries"], 5);
    }
}
