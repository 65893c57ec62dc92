use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

use crate::repository::IdempotencyScope;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool, scope: IdempotencyScope) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            owner_id BIGINT NOT NULL,
            status VARCHAR(20) NOT NULL DEFAULT 'pending',
            payload JSONB NOT NULL,
            idempotency_key VARCHAR(255),
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
            max_retries INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
            lease_holder VARCHAR(255),
            lease_expires_at TIMESTAMPTZ,
            error_message TEXT,
            trace_id UUID NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes backing the claim query, the reaper and per-owner lookups
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_lease ON jobs(status, lease_expires_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_owner_status ON jobs(owner_id, status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_owner_created_at ON jobs(owner_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_trace_id ON jobs(trace_id)")
        .execute(pool)
        .await?;

    // Exactly one of the two uniqueness indexes exists, matching the scope
    let (keep, drop) = match scope {
        IdempotencyScope::Global => (
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_idempotency_global ON jobs(idempotency_key)",
            "DROP INDEX IF EXISTS idx_jobs_idempotency_owner",
        ),
        IdempotencyScope::PerOwner => (
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_idempotency_owner ON jobs(owner_id, idempotency_key)",
            "DROP INDEX IF EXISTS idx_jobs_idempotency_global",
        ),
    };

    sqlx::query(drop).execute(pool).await?;
    sqlx::query(keep).execute(pool).await?;

    tracing::info!(
        "Database migrations completed successfully (idempotency scope: {})",
        scope
    );
    Ok(())
}
