//! Change notifications
//!
//! Every persisted transition produces a [`JobEvent`]. Delivery is
//! best-effort: a notifier never blocks the caller and never fails the
//! transition that produced the event.

use relay_core::domain::event::JobEvent;
use sqlx::PgPool;
use tokio::sync::broadcast;

/// Postgres channel carrying serialized `JobEvent`s between processes
pub const JOB_EVENTS_CHANNEL: &str = "relay_job_events";

/// Sink for job change events
pub trait Notifier: Send + Sync {
    /// Publishes an event; must return immediately
    fn notify(&self, event: JobEvent);
}

/// In-process fan-out over a tokio broadcast channel
///
/// Lossy by nature: slow subscribers miss events rather than applying
/// backpressure to the state machine.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn from_sender(sender: broadcast::Sender<JobEvent>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: JobEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

/// Cross-process delivery through Postgres `NOTIFY`
///
/// Each event is sent from its own task so the transition path never waits
/// on the database round trip.
#[derive(Debug, Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Notifier for PgNotifier {
    fn notify(&self, event: JobEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to serialize event for job {}: {}", event.job_id, e);
                return;
            }
        };

        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query("SELECT pg_notify($1, $2)")
                .bind(JOB_EVENTS_CHANNEL)
                .bind(&payload)
                .execute(&pool)
                .await;

            if let Err(e) = result {
                tracing::warn!("Failed to publish job event: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_core::domain::job::JobStatus;
    use uuid::Uuid;

    fn event() -> JobEvent {
        JobEvent {
            job_id: Uuid::new_v4(),
            owner_id: 1,
            status: JobStatus::Running,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(8);
        notifier.notify(event());
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let sent = event();

        notifier.notify(sent.clone());

        assert_eq!(rx.recv().await.unwrap(), sent);
    }
}
