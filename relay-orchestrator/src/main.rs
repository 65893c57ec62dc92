//! Relay Orchestrator
//!
//! HTTP front door of the work queue: accepts submissions, answers
//! owner-scoped queries, reports metrics, and streams job updates.
//! Execution happens in separate runner processes sharing the database.

use anyhow::Context;
use axum::serve;
use relay_store::{JobLifecycle, JobStore, PgJobStore, PgNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod relay;
pub mod service;

use crate::api::rate_limit::RateLimits;
use crate::config::Config;

const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Relay Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = relay_store::db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    relay_store::db::run_migrations(&pool, config.idempotency_scope)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let lifecycle = JobLifecycle::new(store, Arc::new(PgNotifier::new(pool.clone())));

    let (events, _) = broadcast::channel(EVENT_BUFFER);
    tokio::spawn(relay::relay_notifications(pool, events.clone()));

    let state = api::AppState {
        lifecycle: Arc::new(lifecycle),
        events,
        default_max_retries: config.default_max_retries,
    };
    let limits = Arc::new(RateLimits::per_minute(
        config.submit_rate_limit,
        config.request_rate_limit,
    ));

    // Build router with all API endpoints
    let app = api::create_router(state, limits);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    let shutdown = shutdown_signal().context("Failed to install signal handlers")?;

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error")?;

    tracing::info!("Orchestrator stopped");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT
///
/// Handlers are installed before serving so a signal that arrives during
/// startup is not lost.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        }
    })
}
