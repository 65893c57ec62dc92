//! Metrics API Handler

use axum::{Json, extract::State};
use relay_core::dto::metrics::MetricsSnapshot;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::OwnerId;
use crate::service::metrics as metrics_service;

/// GET /api/metrics
/// System-wide aggregates plus the caller's own counts
pub async fn get_metrics(
    State(state): State<AppState>,
    OwnerId(owner_id): OwnerId,
) -> ApiResult<Json<MetricsSnapshot>> {
    let snapshot = metrics_service::snapshot(state.lifecycle.store().as_ref(), owner_id).await?;
    Ok(Json(snapshot))
}
