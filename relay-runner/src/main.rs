//! Relay Runner
//!
//! A stateless worker that leases jobs from the shared store and executes
//! their payloads.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Services: Payload interpretation and execution
//! - Scheduler: Poll-dispatch loop and lease reaper
//!
//! Any number of runners can share one database; the lease protocol
//! guarantees a job is executed by at most one of them at a time.

mod config;
mod scheduler;
mod service;
mod shutdown;

use anyhow::{Context, Result};
use relay_store::{JobLifecycle, JobStore, LeaseManager, PgJobStore, PgNotifier};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::{JobPoller, LeaseReaper};
use crate::service::{ExecutionService, PayloadExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Relay Runner");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, lease_ttl={:?}, max_parallel_jobs={}",
        config.runner_id, config.lease_ttl, config.max_parallel_jobs
    );

    let pool = connect_with_retry(&config.database_url).await?;
    info!("Database connection established");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let lifecycle = Arc::new(JobLifecycle::new(store, Arc::new(PgNotifier::new(pool))));
    let leases = Arc::new(LeaseManager::new(lifecycle));

    let executor: Arc<dyn ExecutionService> =
        Arc::new(PayloadExecutor::new(config.compute_max_iterations));

    let shutdown =
        shutdown::install_shutdown_handler().context("Failed to install signal handlers")?;

    let reaper = LeaseReaper::new(Arc::clone(&leases), config.reaper_interval);
    let reaper_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reaper.run(shutdown).await })
    };

    let poller = JobPoller::new(config, leases, executor);

    info!("Runner initialized successfully");
    if let Err(e) = poller.run(shutdown).await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    if let Err(e) = reaper_handle.await {
        warn!("Reaper task ended abnormally: {}", e);
    }

    info!("Runner stopped");
    Ok(())
}

/// Loads configuration from environment variables, reporting bad values
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Connects to the store with exponential backoff
///
/// The database may not be accepting connections yet when the runner
/// starts (common in container environments).
async fn connect_with_retry(database_url: &str) -> Result<PgPool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match relay_store::db::create_pool(database_url).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to database after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to database after {} attempts", MAX_RETRIES);
                    return Err(e).context("Failed to connect to database");
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
