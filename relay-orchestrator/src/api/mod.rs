//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod events;
pub mod health;
pub mod job;
pub mod metrics;
pub mod owner;
pub mod rate_limit;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use relay_core::domain::event::JobEvent;
use relay_store::JobLifecycle;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::api::rate_limit::RateLimits;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<JobLifecycle>,
    /// Job updates fanned out to event stream subscribers
    pub events: broadcast::Sender<JobEvent>,
    pub default_max_retries: i32,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState, limits: Arc<RateLimits>) -> Router {
    let api = Router::new()
        .route("/api/jobs", post(job::submit_job).get(job::list_jobs))
        .route("/api/jobs/events", get(events::stream_events))
        .route("/api/jobs/{id}", get(job::get_job))
        .route("/api/metrics", get(metrics::get_metrics))
        .layer(middleware::from_fn_with_state(
            limits.clone(),
            rate_limit::limit_submissions,
        ))
        .layer(middleware::from_fn_with_state(
            limits,
            rate_limit::limit_requests,
        ));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .merge(api)
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
