use axum::{body::Body, http::Request, middleware, routing::get, Router};
use sl_telemetry::metrics::{self, global_metrics, MetricsCollector};
use sl_telemetry::middleware::metrics_middleware;
use sl_telemetry::tracing_setup::{request_id_middleware, REQUEST_ID_HEADER};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Counters and gauges
// ---------------------------------------------------------------------------

#[test]
fn counter_increment() {
    let m = MetricsCollector::new();
    assert_eq!(m.get_counter("requests", &[("method", "GET")]), 0);

    m.increment_counter("requests", &[("method", "GET")]);
    m.increment_counter("requests", &[("method", "GET")]);
    m.increment_counter("requests", &[("method", "POST")]);
    assert_eq!(m.get_counter("requests", &[("method", "GET")]), 2);
    assert_eq!(m.get_counter("requests", &[("method", "POST")]), 1);
}

#[test]
fn gauge_overwrites() {
    let m = MetricsCollector::new();
    m.set_gauge("depth", &[], 5);
    m.set_gauge("depth", &[], 2);
    assert_eq!(m.get_gauge("depth", &[]), 2);
}

#[test]
fn coordinator_helpers_use_sluice_names() {
    let m = MetricsCollector::new();
    m.record_assignment();
    m.record_outcome("failed");
    m.record_outcome("failed");
    m.record_lock_conflicts(3);
    m.record_lock_conflicts(0);
    m.record_reclaims(1);
    m.set_admission_blocked(true);
    m.set_queue_depth("queued", 7);

    assert_eq!(m.get_counter(metrics::ASSIGNMENTS_TOTAL, &[]), 1);
    assert_eq!(
        m.get_counter(metrics::OUTCOMES_TOTAL, &[("outcome", "failed")]),
        2
    );
    assert_eq!(m.get_counter(metrics::LOCK_CONFLICTS_TOTAL, &[]), 3);
    assert_eq!(m.get_counter(metrics::RECLAIMS_TOTAL, &[]), 1);
    assert_eq!(m.get_gauge(metrics::ADMISSION_BLOCKED, &[]), 1);
    assert_eq!(
        m.get_gauge(metrics::QUEUE_DEPTH, &[("status", "queued")]),
        7
    );
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[test]
fn prometheus_export_contains_all_kinds() {
    let m = MetricsCollector::new();
    m.increment_counter("sluice_assignments_total", &[]);
    m.set_gauge("sluice_queue_depth", &[("status", "queued")], 4);
    m.record_histogram("latency", &[], 0.003);
    m.record_histogram("latency", &[], 10.0);

    let text = m.export_prometheus();
    assert!(text.contains("# TYPE sluice_assignments_total counter"));
    assert!(text.contains("sluice_assignments_total 1"));
    assert!(text.contains("sluice_queue_depth{status=\"queued\"} 4"));
    assert!(text.contains("# TYPE latency histogram"));
    assert!(text.contains("latency_bucket{le=\"0.001\"} 0"));
    assert!(text.contains("latency_bucket{le=\"0.005\"} 1"));
    assert!(text.contains("latency_bucket{le=\"5\"} 1"));
    assert!(text.contains("latency_bucket{le=\"+Inf\"} 2"));
    assert!(text.contains("latency_count 2"));
}

#[test]
fn json_export_shape() {
    let m = MetricsCollector::new();
    m.increment_counter("c", &[("k", "v")]);
    m.set_gauge("g", &[], -1);
    m.record_histogram("h", &[], 0.2);

    let json = m.export_json();
    assert_eq!(json["counters"][0]["name"], "c");
    assert_eq!(json["counters"][0]["labels"]["k"], "v");
    assert_eq!(json["gauges"][0]["value"], -1);
    assert_eq!(json["histograms"][0]["count"], 1);
}

#[test]
fn concurrent_increments_are_not_lost() {
    let m = std::sync::Arc::new(MetricsCollector::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let m = m.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    m.increment_counter("hits", &[]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(m.get_counter("hits", &[]), 8000);
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

fn app() -> Router {
    Router::new()
        .route("/tasks/{id}", get(|| async { "ok" }))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
}

#[tokio::test]
async fn request_id_is_generated_and_echoed() {
    let resp = app()
        .oneshot(Request::get("/tasks/a").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let id = resp.headers().get(REQUEST_ID_HEADER).unwrap();
    assert_eq!(id.len(), 32);

    let resp = app()
        .oneshot(
            Request::get("/tasks/a")
                .header(REQUEST_ID_HEADER, "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
}

#[tokio::test]
async fn metrics_middleware_labels_by_route_template() {
    let labels = [("method", "GET"), ("path", "/tasks/{id}"), ("status", "200")];
    let before = global_metrics().get_counter(metrics::API_REQUESTS_TOTAL, &labels);

    for id in ["x1", "x2"] {
        app()
            .oneshot(
                Request::get(format!("/tasks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    let after = global_metrics().get_counter(metrics::API_REQUESTS_TOTAL, &labels);
    assert!(after >= before + 2);
    assert!(
        global_metrics().histogram_count(
            metrics::API_REQUEST_DURATION,
            &[("method", "GET"), ("path", "/tasks/{id}")]
        ) >= 2
    );
}
