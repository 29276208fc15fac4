// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------
//
// Handlers are grouped by concern; this file owns the router and its
// middleware stack.

mod misc;
pub mod state;
mod tasks;
#[cfg(test)]
mod tests;
mod work;

pub use state::ApiState;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use sl_telemetry::middleware::metrics_middleware;
use sl_telemetry::tracing_setup::request_id_middleware;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthLayer;

/// Router without authentication (local development and tests).
pub fn api_router(state: Arc<ApiState>) -> Router {
    api_router_with_auth(state, None)
}

/// Full router. With `api_key` set every route except `/health` requires it.
pub fn api_router_with_auth(state: Arc<ApiState>, api_key: Option<String>) -> Router {
    Router::new()
        .route("/work/request", post(work::request_work))
        .route("/work/start", post(work::start_work))
        .route("/work/report", post(work::report_outcome))
        .route("/work/release", post(work::release))
        .route("/heartbeat", post(work::heartbeat))
        .route("/status", get(misc::get_status))
        .route("/review/disposition", post(tasks::review_disposition))
        .route("/tasks", get(tasks::list_tasks).post(tasks::ingest_tasks))
        .route(
            "/tasks/{id}",
            get(tasks::get_task).delete(tasks::archive_task),
        )
        .route("/health", get(misc::health))
        .route("/metrics", get(misc::metrics))
        .route("/metrics/json", get(misc::metrics_json))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(AuthLayer::new(api_key))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(
                    |origin: &axum::http::HeaderValue, _parts: &axum::http::request::Parts| {
                        origin.to_str().is_ok_and(|o| {
                            o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1")
                        })
                    },
                ))
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::HeaderName::from_static("x-api-key"),
                ]),
        )
        .with_state(state)
}
