//! Job API Handlers
//!
//! Submission and owner-scoped queries. Every endpoint requires the
//! `X-Owner-Id` header.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use relay_core::dto::job::{JobPage, JobView, ListJobsQuery, SubmitJob, SubmitJobResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::OwnerId;
use crate::service::job as job_service;

const CREATED_MESSAGE: &str = "Job submitted successfully";
const REPLAYED_MESSAGE: &str = "Job already exists with this idempotency key";

/// POST /api/jobs
/// Submit a job, or get back the existing one for a repeated idempotency key
pub async fn submit_job(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Json(req): Json<SubmitJob>,
) -> ApiResult<Json<SubmitJobResponse>> {
    tracing::debug!("Submitting job for owner {}", owner_id);

    let submission =
        job_service::submit_job(&state.lifecycle, owner_id, req, state.default_max_retries)
            .await?;

    let message = if submission.created {
        CREATED_MESSAGE
    } else {
        REPLAYED_MESSAGE
    };

    Ok(Json(SubmitJobResponse {
        id: submission.job.id,
        status: submission.job.status,
        trace_id: submission.job.trace_id,
        message: message.to_string(),
    }))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    tracing::debug!("Getting job {} for owner {}", id, owner_id);

    let job = job_service::get_job(state.lifecycle.store().as_ref(), owner_id, id).await?;
    Ok(Json(job.into()))
}

/// GET /api/jobs?status=&page=&per_page=
pub async fn list_jobs(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<JobPage>> {
    tracing::debug!("Listing jobs for owner {}", owner_id);

    let page = job_service::list_jobs(state.lifecycle.store().as_ref(), owner_id, query).await?;
    Ok(Json(page))
}
