//! Job poller
//!
//! Scans the store for claimable jobs on a fixed interval, leases them
//! subject to the per-owner cap and the local slot limit, and runs each
//! leased job in its own task. Leasing never waits on execution.

use anyhow::Result;
use chrono::Utc;
use relay_core::domain::job::Job;
use relay_store::{LeaseManager, LifecycleError, StoreError};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{ExecutionError, ExecutionService};

/// Job poller that continuously leases and dispatches jobs
pub struct JobPoller {
    config: Config,
    leases: Arc<LeaseManager>,
    executor: Arc<dyn ExecutionService>,
    semaphore: Arc<Semaphore>,
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: Config,
        leases: Arc<LeaseManager>,
        executor: Arc<dyn ExecutionService>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            leases,
            executor,
            semaphore,
        }
    }

    /// Runs the polling loop until `shutdown` is cancelled
    ///
    /// Store failures end the current cycle only; the next tick tries again.
    /// On shutdown, waits for every in-flight execution to report.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker = %self.config.runner_id,
            "Starting job poller (interval: {:?}, batch: {}, owner cap: {})",
            self.config.poll_interval,
            self.config.batch_size,
            self.config.owner_concurrency_cap
        );

        let mut tasks = JoinSet::new();
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.poll_once(&mut tasks).await {
                Ok(dispatched) if dispatched > 0 => {
                    info!("Dispatched {} job(s) this cycle", dispatched);
                }
                Ok(_) => {}
                Err(e) => error!("Error during poll cycle: {}", e),
            }

            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    warn!("Job task ended abnormally: {}", e);
                }
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight job(s) to finish", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Job task ended abnormally: {}", e);
            }
        }

        info!("Job poller stopped");
        Ok(())
    }

    /// Performs a single poll cycle
    ///
    /// # Returns
    /// Number of jobs leased and dispatched
    pub async fn poll_once(&self, tasks: &mut JoinSet<()>) -> Result<usize, StoreError> {
        let store = self.leases.lifecycle().store();
        let candidates = store
            .list_claimable(self.config.batch_size, Utc::now())
            .await?;

        if candidates.is_empty() {
            debug!("No jobs available");
            return Ok(0);
        }

        let mut dispatched = 0;

        for candidate in candidates {
            let running = match store.count_running_for_owner(candidate.owner_id).await {
                Ok(running) => running,
                Err(e) => {
                    warn!(job_id = %candidate.id, "Failed to count running jobs: {}", e);
                    continue;
                }
            };

            if running >= self.config.owner_concurrency_cap {
                debug!(
                    job_id = %candidate.id,
                    "Owner {} has {} running job(s), skipping",
                    candidate.owner_id,
                    running
                );
                continue;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("All execution slots busy, leaving remaining jobs for next cycle");
                break;
            };

            match self
                .leases
                .acquire(candidate.id, &self.config.runner_id, self.config.lease_ttl)
                .await
            {
                Ok(Some(job)) => {
                    info!(
                        worker = %self.config.runner_id,
                        job_id = %job.id,
                        trace_id = %job.trace_id,
                        "Leased job"
                    );
                    self.spawn_job_task(tasks, job, permit);
                    dispatched += 1;
                }
                Ok(None) => {
                    debug!(job_id = %candidate.id, "Lost lease race, moving on");
                }
                Err(e) => {
                    warn!(job_id = %candidate.id, "Failed to lease job: {}", e);
                }
            }
        }

        Ok(dispatched)
    }

    /// Spawns a task that executes one leased job and reports its outcome
    fn spawn_job_task(&self, tasks: &mut JoinSet<()>, job: Job, permit: OwnedSemaphorePermit) {
        let leases = Arc::clone(&self.leases);
        let executor = Arc::clone(&self.executor);
        let runner_id = self.config.runner_id.clone();

        tasks.spawn(async move {
            Self::execute_job(job, &runner_id, leases, executor).await;
            // Permit is released when dropped
            drop(permit);
        });
    }

    /// Executes a single job and applies exactly one ack or fail
    ///
    /// The report is fenced on the lease `leased` was granted under, so an
    /// execution that outlived its lease cannot settle a later attempt.
    async fn execute_job(
        leased: Job,
        runner_id: &str,
        leases: Arc<LeaseManager>,
        executor: Arc<dyn ExecutionService>,
    ) {
        let job_id = leased.id;
        let trace_id = leased.trace_id;
        let job = leased.clone();

        // A panicking payload must still produce a report
        let outcome = tokio::spawn(async move { executor.execute(&job).await })
            .await
            .unwrap_or_else(|e| Err(ExecutionError::Panicked(e.to_string())));

        let lifecycle = leases.lifecycle();
        let reported = match &outcome {
            Ok(result) => {
                debug!(job_id = %job_id, "Result: {}", result);
                lifecycle.ack(&leased, runner_id, Utc::now()).await
            }
            Err(e) => {
                lifecycle
                    .fail(&leased, runner_id, &e.to_string(), Utc::now())
                    .await
            }
        };

        match reported {
            Ok(job) if job.status.is_terminal() => info!(
                worker = %runner_id,
                job_id = %job_id,
                trace_id = %trace_id,
                retry_count = job.retry_count,
                "Job finished as {}",
                job.status
            ),
            Ok(job) => info!(
                worker = %runner_id,
                job_id = %job_id,
                trace_id = %trace_id,
                retry_count = job.retry_count,
                "Job requeued for retry"
            ),
            Err(e @ (LifecycleError::Rejected(_) | LifecycleError::Conflict(_))) => warn!(
                worker = %runner_id,
                job_id = %job_id,
                trace_id = %trace_id,
                "Outcome discarded, lease no longer held: {}",
                e
            ),
            Err(e) => error!(
                worker = %runner_id,
                job_id = %job_id,
                trace_id = %trace_id,
                "Failed to report outcome, lease expiry will recover the job: {}",
                e
            ),
        }
    }
}
