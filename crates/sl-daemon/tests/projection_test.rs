//! Event-to-backlog projection through a live scheduler.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sl_core::config::Config;
use sl_core::events::SchedulerEvent;
use sl_core::scheduler::{Coordinator, Scheduler};
use sl_core::types::{Outcome, TaskDescriptor, TaskId, WorkerId};
use sl_daemon::projection::{project_event, projection_loop};
use sl_daemon::shutdown::ShutdownSignal;
use sl_integrations::backlog::Backlog;
use sl_integrations::memory::MemoryBacklog;
use sl_integrations::projection::LabelScheme;

fn ready_item(id: &str) -> TaskDescriptor {
    let mut desc = TaskDescriptor::new(id, format!("issue {id}"));
    desc.labels = vec!["ai-ready".to_string()];
    desc.estimated_files = BTreeSet::from([format!("src/{id}.rs")]);
    desc
}

async fn drain(
    events: &flume::Receiver<SchedulerEvent>,
    backlog: &MemoryBacklog,
) -> usize {
    let scheme = LabelScheme::default();
    let mut failed = 0;
    for event in events.drain() {
        failed += project_event(backlog, &scheme, &event).await;
    }
    failed
}

fn labels(backlog: &MemoryBacklog, id: &str) -> Vec<String> {
    backlog.labels(&TaskId::from(id)).into_iter().collect()
}

#[tokio::test]
async fn labels_follow_task_lifecycle() {
    let backlog = MemoryBacklog::new();
    backlog.insert(ready_item("acme/api#1"));
    let scheduler = Scheduler::new(Coordinator::new(&Config::default()));
    let events = scheduler.event_bus().subscribe();
    let w1 = WorkerId::from("w1");
    let id = TaskId::from("acme/api#1");

    scheduler
        .ingest_descriptors(vec![ready_item("acme/api#1")])
        .await
        .unwrap();
    scheduler.request_work(&w1, None).await;
    assert_eq!(drain(&events, &backlog).await, 0);
    assert_eq!(labels(&backlog, "acme/api#1"), vec!["ai-in-progress"]);

    scheduler.start_work(&w1, &id).await.unwrap();
    scheduler
        .report_outcome(
            &w1,
            &id,
            Outcome::Completed,
            Some("https://example.test/pull/9".to_string()),
        )
        .await
        .unwrap();
    drain(&events, &backlog).await;

    assert_eq!(labels(&backlog, "acme/api#1"), vec!["ai-completed"]);
    let comments = backlog.comments(&id);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("https://example.test/pull/9"));
}

#[tokio::test]
async fn failure_with_retries_left_returns_to_ready() {
    let backlog = MemoryBacklog::new();
    backlog.insert(ready_item("acme/api#2"));
    let scheduler = Scheduler::new(Coordinator::new(&Config::default()));
    let events = scheduler.event_bus().subscribe();
    let w1 = WorkerId::from("w1");
    let id = TaskId::from("acme/api#2");

    scheduler
        .ingest_descriptors(vec![ready_item("acme/api#2")])
        .await
        .unwrap();
    scheduler.request_work(&w1, None).await;
    scheduler
        .report_outcome(&w1, &id, Outcome::Failed, Some("tests red".to_string()))
        .await
        .unwrap();
    drain(&events, &backlog).await;

    assert_eq!(labels(&backlog, "acme/api#2"), vec!["ai-ready"]);
    let comments = backlog.comments(&id);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("tests red"));
}

#[tokio::test]
async fn write_failures_do_not_touch_the_scheduler() {
    let backlog = MemoryBacklog::new();
    backlog.insert(ready_item("acme/api#3"));
    backlog.set_fail_writes(true);
    let scheduler = Scheduler::new(Coordinator::new(&Config::default()));
    let events = scheduler.event_bus().subscribe();

    scheduler
        .ingest_descriptors(vec![ready_item("acme/api#3")])
        .await
        .unwrap();
    scheduler.request_work(&WorkerId::from("w1"), None).await;

    assert_eq!(drain(&events, &backlog).await, 1);
    assert_eq!(labels(&backlog, "acme/api#3"), vec!["ai-ready"]);
    let task = scheduler.task(&TaskId::from("acme/api#3")).await.unwrap();
    assert_eq!(task.assigned_worker, Some(WorkerId::from("w1")));
}

#[tokio::test]
async fn loop_projects_until_shutdown() {
    let backlog = Arc::new(MemoryBacklog::new());
    backlog.insert(ready_item("acme/api#4"));
    let scheduler = Scheduler::new(Coordinator::new(&Config::default()));
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(projection_loop(
        scheduler.event_bus().subscribe(),
        backlog.clone() as Arc<dyn Backlog>,
        LabelScheme::default(),
        shutdown.clone(),
    ));

    scheduler
        .ingest_descriptors(vec![ready_item("acme/api#4")])
        .await
        .unwrap();
    scheduler.request_work(&WorkerId::from("w1"), None).await;

    let mut projected = false;
    for _ in 0..50 {
        if labels(&backlog, "acme/api#4") == vec!["ai-in-progress"] {
            projected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(projected);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop stops on shutdown")
        .unwrap();
}
