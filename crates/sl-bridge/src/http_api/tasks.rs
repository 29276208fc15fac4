use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sl_api_types::{DispositionRequest, DispositionResponse, IngestRequest, IngestResponse};
use sl_core::types::{Task, TaskId, TaskStatus};
use sl_telemetry::metrics::global_metrics;

use super::state::ApiState;
use crate::api_error::ApiError;

#[derive(Debug, Deserialize)]
pub(crate) struct TaskListQuery {
    status: Option<TaskStatus>,
}

/// POST /tasks -- ingest a batch; all or nothing.
pub(crate) async fn ingest_tasks(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let Json(req) = body?;
    let ingested = state.scheduler.ingest_descriptors(req.tasks).await?;
    global_metrics().record_ingested(ingested.len());
    Ok((StatusCode::CREATED, Json(IngestResponse { ingested })))
}

/// GET /tasks
pub(crate) async fn list_tasks(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TaskListQuery>,
) -> Json<Vec<Task>> {
    let mut tasks = state.scheduler.tasks().await;
    if let Some(status) = query.status {
        tasks.retain(|t| t.status == status);
    }
    Json(tasks)
}

/// GET /tasks/{id}
pub(crate) async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_id = TaskId::from(id);
    state
        .scheduler
        .task(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task not found: {task_id}")))
}

/// DELETE /tasks/{id} -- archive a completed or failed task.
pub(crate) async fn archive_task(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state.scheduler.archive(&TaskId::from(id)).await?;
    Ok(Json(task))
}

/// POST /review/disposition
pub(crate) async fn review_disposition(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DispositionRequest>, JsonRejection>,
) -> Result<Json<DispositionResponse>, ApiError> {
    let Json(req) = body?;
    let changed = state
        .scheduler
        .on_disposition(&req.task_id, req.state)
        .await?;
    Ok(Json(DispositionResponse { changed }))
}
