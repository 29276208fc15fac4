use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{global_metrics, API_REQUESTS_TOTAL, API_REQUEST_DURATION};

/// Records `api_requests_total{method,path,status}` and
/// `api_request_duration_seconds{method,path}` for every request.
///
/// `path` is the matched route template (`/tasks/{id}`), not the raw URI,
/// so task ids do not fan out into separate series.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let m = global_metrics();
    m.increment_counter(
        API_REQUESTS_TOTAL,
        &[("method", &method), ("path", &path), ("status", &status)],
    );
    m.record_histogram(
        API_REQUEST_DURATION,
        &[("method", &method), ("path", &path)],
        elapsed,
    );

    response
}
