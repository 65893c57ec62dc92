//! Lease reaper
//!
//! Reclaims jobs whose worker stopped reporting before its lease ran out.

use relay_store::LeaseManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Expired leases reclaimed per pass
const REAP_BATCH: usize = 100;

pub struct LeaseReaper {
    leases: Arc<LeaseManager>,
    interval: Duration,
}

impl LeaseReaper {
    pub fn new(leases: Arc<LeaseManager>, interval: Duration) -> Self {
        Self { leases, interval }
    }

    /// Runs reaper passes until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting lease reaper (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.leases.reap_expired(REAP_BATCH).await {
                Ok(0) => debug!("No expired leases"),
                Ok(reclaimed) => info!("Reclaimed {} job(s) with expired leases", reclaimed),
                Err(e) => error!("Error during reaper pass: {}", e),
            }
        }

        info!("Lease reaper stopped");
    }
}
