use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use sl_api_types::{HealthResponse, StatusResponse};
use sl_telemetry::metrics::global_metrics;

use super::state::ApiState;

/// GET /status
pub(crate) async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let status = state.scheduler.status().await;

    let m = global_metrics();
    m.set_admission_blocked(status.admission.blocked);
    m.set_queue_depth("queued", status.queue.queued);
    m.set_queue_depth("assigned", status.queue.assigned);
    m.set_queue_depth("in_progress", status.queue.in_progress);

    Json(status.into())
}

/// GET /health
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics -- Prometheus text format.
pub(crate) async fn metrics() -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        global_metrics().export_prometheus(),
    )
}

/// GET /metrics/json
pub(crate) async fn metrics_json() -> Json<serde_json::Value> {
    Json(global_metrics().export_json())
}
