use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use sl_core::config::Config;
use sl_core::scheduler::{Coordinator, Scheduler};
use tower::ServiceExt;

fn test_app() -> (Router, Arc<ApiState>) {
    let scheduler = Arc::new(Scheduler::new(Coordinator::new(&Config::default())));
    let state = Arc::new(ApiState::new(scheduler, 30));
    (api_router(state.clone()), state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn ingest(app: &Router, tasks: Value) -> (StatusCode, Value) {
    call(app, "POST", "/tasks", Some(json!({ "tasks": tasks }))).await
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = test_app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn full_work_cycle() {
    let (app, _) = test_app();

    let (status, body) = ingest(
        &app,
        json!([{ "id": "t1", "title": "first", "estimated_files": ["src/a.rs"] }]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ingested"], json!(["t1"]));

    let (status, body) = call(
        &app,
        "POST",
        "/work/request",
        Some(json!({ "worker_id": "w1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["work_available"], true);
    assert_eq!(body["task"]["id"], "t1");
    assert_eq!(body["task"]["status"], "assigned");

    let (status, body) = call(
        &app,
        "POST",
        "/work/start",
        Some(json!({ "worker_id": "w1", "task_id": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");

    let (status, body) = call(
        &app,
        "POST",
        "/work/report",
        Some(json!({
            "worker_id": "w1",
            "task_id": "t1",
            "outcome": "completed",
            "detail": "https://example.test/pull/1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["task"]["status"], "completed");

    let (_, body) = call(&app, "GET", "/status", None).await;
    assert_eq!(body["pending_count"], 1);
    assert_eq!(body["queue"]["completed"], 1);
    assert_eq!(body["review_units"][0]["url"], "https://example.test/pull/1");

    let (status, body) = call(
        &app,
        "POST",
        "/review/disposition",
        Some(json!({ "task_id": "t1", "state": "merged" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, body) = call(&app, "GET", "/status", None).await;
    assert_eq!(body["pending_count"], 0);
}

#[tokio::test]
async fn no_work_carries_backoff() {
    let (app, _) = test_app();
    let (status, body) = call(
        &app,
        "POST",
        "/work/request",
        Some(json!({ "worker_id": "w1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["work_available"], false);
    assert_eq!(body["blocked"], false);
    assert_eq!(body["poll_backoff_secs"], 30);
}

#[tokio::test]
async fn duplicate_ingest_is_conflict() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;
    let (status, body) = ingest(&app, json!([{ "id": "t1", "title": "again" }])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("t1"));
}

#[tokio::test]
async fn cyclic_batch_is_unprocessable_and_not_stored() {
    let (app, _) = test_app();
    let (status, body) = ingest(
        &app,
        json!([
            { "id": "a", "title": "a", "dependencies": ["b"] },
            { "id": "b", "title": "b", "dependencies": ["a"] }
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("cycle"));

    let (_, body) = call(&app, "GET", "/tasks", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/work/request")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/work/report",
        Some(json!({ "worker_id": "w1", "task_id": "t1", "outcome": "exploded" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn report_from_wrong_worker_is_conflict() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;
    call(&app, "POST", "/work/request", Some(json!({ "worker_id": "w1" }))).await;

    let (status, _) = call(
        &app,
        "POST",
        "/work/report",
        Some(json!({ "worker_id": "w2", "task_id": "t1", "outcome": "completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let (app, _) = test_app();
    let (status, _) = call(&app, "GET", "/tasks/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/work/report",
        Some(json!({ "worker_id": "w1", "task_id": "nope", "outcome": "failed" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/review/disposition",
        Some(json!({ "task_id": "nope", "state": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn encoded_backlog_ids_resolve() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "acme/api#12", "title": "a" }])).await;
    let (status, body) = call(&app, "GET", "/tasks/acme%2Fapi%2312", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "acme/api#12");
}

#[tokio::test]
async fn archive_only_terminal_tasks() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;
    call(&app, "POST", "/work/request", Some(json!({ "worker_id": "w1" }))).await;

    let (status, _) = call(&app, "DELETE", "/tasks/t1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    call(
        &app,
        "POST",
        "/work/report",
        Some(json!({ "worker_id": "w1", "task_id": "t1", "outcome": "completed" })),
    )
    .await;
    let (status, body) = call(&app, "DELETE", "/tasks/t1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "t1");

    let (status, _) = call(&app, "GET", "/tasks/t1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_status() {
    let (app, _) = test_app();
    ingest(
        &app,
        json!([
            { "id": "t1", "title": "a", "estimated_files": ["a.rs"] },
            { "id": "t2", "title": "b", "estimated_files": ["b.rs"] }
        ]),
    )
    .await;
    call(&app, "POST", "/work/request", Some(json!({ "worker_id": "w1" }))).await;

    let (_, body) = call(&app, "GET", "/tasks?status=queued", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (_, body) = call(&app, "GET", "/tasks?status=assigned", None).await;
    assert_eq!(body[0]["id"], "t1");
}

#[tokio::test]
async fn release_and_heartbeat() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;
    call(&app, "POST", "/work/request", Some(json!({ "worker_id": "w1" }))).await;

    let (status, body) = call(
        &app,
        "POST",
        "/heartbeat",
        Some(json!({ "worker_id": "w1", "task_id": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_task"], "t1");

    let (status, body) = call(
        &app,
        "POST",
        "/work/release",
        Some(json!({ "worker_id": "w1", "task_id": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["status"], "queued");
    assert_eq!(body["task"]["retry_count"], 0);
}

#[tokio::test]
async fn metrics_exposes_prometheus_text() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;
    call(&app, "POST", "/work/request", Some(json!({ "worker_id": "w1" }))).await;

    let resp = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sluice_assignments_total"));
    assert!(text.contains("api_requests_total"));
}

#[tokio::test]
async fn metrics_json_lists_counters() {
    let (app, _) = test_app();
    ingest(&app, json!([{ "id": "t1", "title": "a" }])).await;

    let (status, body) = call(&app, "GET", "/metrics/json", None).await;
    assert_eq!(status, StatusCode::OK);
    let counters = body["counters"].as_array().unwrap();
    assert!(counters
        .iter()
        .any(|c| c["name"] == "sluice_tasks_ingested_total"));
    assert!(body["histograms"].is_array());
}
