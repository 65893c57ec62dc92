//! Cross-process event relay
//!
//! Runners publish job events with Postgres `NOTIFY`. This task listens on
//! the channel and re-broadcasts each event to the orchestrator's local
//! subscribers (the SSE streams).

use relay_core::domain::event::JobEvent;
use relay_store::notify::JOB_EVENTS_CHANNEL;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::broadcast;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Forwards store notifications into `events` until the process exits
///
/// A dropped listener connection is re-established after a short delay.
/// Events published while disconnected are lost.
pub async fn relay_notifications(pool: PgPool, events: broadcast::Sender<JobEvent>) {
    loop {
        if let Err(e) = listen(&pool, &events).await {
            tracing::warn!(
                "Event listener disconnected: {}. Reconnecting in {:?}",
                e,
                RECONNECT_DELAY
            );
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn listen(pool: &PgPool, events: &broadcast::Sender<JobEvent>) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(JOB_EVENTS_CHANNEL).await?;
    tracing::info!("Listening for job events on '{}'", JOB_EVENTS_CHANNEL);

    loop {
        let notification = listener.recv().await?;
        if let Some(event) = decode_event(notification.payload()) {
            // No subscribers is fine
            let _ = events.send(event);
        }
    }
}

fn decode_event(payload: &str) -> Option<JobEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Ignoring malformed job event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_core::domain::job::JobStatus;
    use uuid::Uuid;

    #[test]
    fn test_decode_event() {
        let event = JobEvent {
            job_id: Uuid::new_v4(),
            owner_id: 7,
            status: JobStatus::Done,
            occurred_at: Utc::now(),
        };
        let payload = serde_json::to_string(&event).unwrap();

        let decoded = decode_event(&payload).unwrap();
        assert_eq!(decoded.job_id, event.job_id);
        assert_eq!(decoded.owner_id, 7);
        assert_eq!(decoded.status, JobStatus::Done);

        assert!(decode_event("not json").is_none());
    }
}
