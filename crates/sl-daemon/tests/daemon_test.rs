//! Daemon startup, serving and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sl_core::config::Config;
use sl_core::scheduler::{Coordinator, Scheduler};
use sl_core::types::{TaskDescriptor, TaskId};
use sl_daemon::daemon::{Daemon, DaemonIntervals};
use sl_integrations::memory::MemoryBacklog;

async fn start(daemon: Daemon) -> (String, Arc<Daemon>, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to ephemeral port");
    let addr = listener.local_addr().unwrap();
    let daemon = Arc::new(daemon);
    let runner = daemon.clone();
    let handle = tokio::spawn(async move { runner.run_with_listener(listener).await });
    (format!("http://{addr}"), daemon, handle)
}

fn in_memory(config: Config) -> Daemon {
    let scheduler = Arc::new(Scheduler::new(Coordinator::new(&config)));
    Daemon::with_scheduler(config, scheduler)
}

#[tokio::test]
async fn serves_api_and_stops_on_shutdown() {
    let (base, daemon, handle) = start(in_memory(Config::default())).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let resp = client
        .post(format!("{base}/tasks"))
        .json(&json!({ "tasks": [{ "id": "t1", "title": "first" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert!(daemon.scheduler().task(&TaskId::from("t1")).await.is_some());

    daemon.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn backlog_items_are_pulled_in() {
    let backlog = Arc::new(MemoryBacklog::new());
    let mut item = TaskDescriptor::new("acme/api#7", "from the backlog");
    item.labels = vec!["ai-ready".to_string()];
    backlog.insert(item);

    let mut daemon = in_memory(Config::default()).with_backlog(backlog.clone());
    daemon.set_intervals(DaemonIntervals {
        sweep_secs: 60,
        intake_secs: 1,
    });
    let (_base, daemon, handle) = start(daemon).await;

    let id = TaskId::from("acme/api#7");
    let mut found = false;
    for _ in 0..50 {
        if daemon.scheduler().task(&id).await.is_some() {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(found, "intake ingests ready backlog items");

    daemon.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("daemon stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn cache_disabled_daemon_starts_in_memory() {
    let mut config = Config::default();
    config.cache.enabled = false;
    let daemon = Daemon::new(config).await.unwrap();
    assert!(daemon.scheduler().tasks().await.is_empty());
}
