//! The worker protocol: request, start, report, release, heartbeat.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use sl_api_types::{
    HeartbeatRequest, ReportRequest, ReportResponse, TaskClaim, WorkRequest, WorkResponse,
};
use sl_core::types::{Task, Worker};
use sl_telemetry::metrics::global_metrics;

use super::state::ApiState;
use crate::api_error::ApiError;

/// POST /work/request
pub(crate) async fn request_work(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<WorkRequest>, JsonRejection>,
) -> Result<Json<WorkResponse>, ApiError> {
    let Json(req) = body?;
    let assignment = state
        .scheduler
        .request_work(&req.worker_id, req.specialization)
        .await;

    let m = global_metrics();
    m.record_lock_conflicts(assignment.conflicts_skipped);
    match &assignment.task {
        Some(task) => {
            m.record_assignment();
            tracing::info!(worker_id = %req.worker_id, task_id = %task.id, "work assigned");
        }
        None => {
            tracing::debug!(
                worker_id = %req.worker_id,
                blocked = assignment.blocked,
                conflicts_skipped = assignment.conflicts_skipped,
                "no work available"
            );
        }
    }

    Ok(Json(WorkResponse::from_assignment(
        assignment,
        state.poll_backoff_secs,
    )))
}

/// POST /work/start
pub(crate) async fn start_work(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<TaskClaim>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(req) = body?;
    let task = state
        .scheduler
        .start_work(&req.worker_id, &req.task_id)
        .await?;
    Ok(Json(task))
}

/// POST /work/report
pub(crate) async fn report_outcome(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportResponse>, ApiError> {
    let Json(req) = body?;
    let report = state
        .scheduler
        .report_outcome(&req.worker_id, &req.task_id, req.outcome, req.detail)
        .await?;

    if report.changed {
        global_metrics().record_outcome(req.outcome.as_str());
        tracing::info!(
            worker_id = %req.worker_id,
            task_id = %req.task_id,
            outcome = req.outcome.as_str(),
            status = %report.task.status,
            "outcome recorded"
        );
    }
    Ok(Json(report.into()))
}

/// POST /work/release
pub(crate) async fn release(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<TaskClaim>, JsonRejection>,
) -> Result<Json<ReportResponse>, ApiError> {
    let Json(req) = body?;
    let report = state.scheduler.release(&req.worker_id, &req.task_id).await?;
    if report.changed {
        global_metrics().record_outcome("released");
    }
    Ok(Json(report.into()))
}

/// POST /heartbeat
pub(crate) async fn heartbeat(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<Worker>, ApiError> {
    let Json(req) = body?;
    let worker = state
        .scheduler
        .heartbeat(&req.worker_id, req.task_id.as_ref())
        .await;
    Ok(Json(worker))
}
