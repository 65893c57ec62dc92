//! Execution service
//!
//! Runs the work described by a job's payload and returns its outcome.
//! Reporting the outcome back to the state machine is the poller's job;
//! the executor itself never touches the store.

use async_trait::async_trait;
use relay_core::domain::job::Job;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::payload::Payload;

/// Payload processing failure
///
/// The `Display` text is what ends up in the job's `error_message`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown payload kind: {0}")]
    UnknownKind(String),

    #[error("Requested {requested} iterations, limit is {limit}")]
    IterationLimit { requested: u64, limit: u64 },

    /// Failure raised by the payload itself
    #[error("{0}")]
    Raised(String),

    #[error("Execution panicked: {0}")]
    Panicked(String),
}

/// Service trait for executing job payloads
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes a leased job
    ///
    /// # Arguments
    /// * `job` - The running job, as returned by the lease
    ///
    /// # Returns
    /// A result value on success; any error is reported as a failure
    async fn execute(&self, job: &Job) -> Result<Value, ExecutionError>;
}

/// Executes the built-in payload kinds
pub struct PayloadExecutor {
    compute_max_iterations: u64,
}

impl PayloadExecutor {
    pub fn new(compute_max_iterations: u64) -> Self {
        Self {
            compute_max_iterations,
        }
    }

    async fn compute(&self, iterations: u64) -> Result<Value, ExecutionError> {
        if iterations > self.compute_max_iterations {
            return Err(ExecutionError::IterationLimit {
                requested: iterations,
                limit: self.compute_max_iterations,
            });
        }

        // CPU-bound; keep it off the async workers
        let result = tokio::task::spawn_blocking(move || {
            (0..iterations).map(|i| (i as f64).sqrt()).sum::<f64>()
        })
        .await
        .map_err(|e| ExecutionError::Panicked(e.to_string()))?;

        Ok(json!({ "result": result, "iterations": iterations }))
    }
}

#[async_trait]
impl ExecutionService for PayloadExecutor {
    async fn execute(&self, job: &Job) -> Result<Value, ExecutionError> {
        let payload = Payload::parse(&job.payload)?;
        debug!(job_id = %job.id, "Executing {} payload", payload.kind());

        match payload {
            Payload::Sleep { duration } => {
                tokio::time::sleep(duration).await;
                Ok(json!({ "slept": duration.as_secs_f64() }))
            }
            Payload::Compute { iterations } => self.compute(iterations).await,
            Payload::Fail { error_message } => Err(ExecutionError::Raised(error_message)),
            Payload::Default => Ok(json!({ "message": "Job processed successfully" })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(payload: Value) -> Job {
        Job::new(1, payload, None, 3, Utc::now())
    }

    #[tokio::test]
    async fn test_default_payload_succeeds() {
        let executor = PayloadExecutor::new(1000);
        let result = executor.execute(&job(json!({"note": "hi"}))).await.unwrap();
        assert_eq!(result["message"], "Job processed successfully");
    }

    #[tokio::test]
    async fn test_sleep_payload_waits() {
        let executor = PayloadExecutor::new(1000);
        let started = std::time::Instant::now();

        let result = executor
            .execute(&job(json!({"kind": "sleep", "duration": 0.05})))
            .await
            .unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_millis(50));
        assert_eq!(result["slept"], 0.05);
    }

    #[tokio::test]
    async fn test_compute_payload_sums_roots() {
        let executor = PayloadExecutor::new(1000);
        let result = executor
            .execute(&job(json!({"kind": "compute", "iterations": 5})))
            .await
            .unwrap();

        let expected: f64 = (0..5u64).map(|i| (i as f64).sqrt()).sum();
        assert_eq!(result["result"].as_f64().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_compute_over_limit_fails() {
        let executor = PayloadExecutor::new(10);
        let err = executor
            .execute(&job(json!({"kind": "compute", "iterations": 11})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::IterationLimit {
                requested: 11,
                limit: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_fail_payload_keeps_raw_message() {
        let executor = PayloadExecutor::new(1000);
        let err = executor
            .execute(&job(json!({"kind": "fail", "error_message": "boom"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_unknown_kind_fails() {
        let executor = PayloadExecutor::new(1000);
        let err = executor
            .execute(&job(json!({"kind": "teleport"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown payload kind: teleport");
    }
}
