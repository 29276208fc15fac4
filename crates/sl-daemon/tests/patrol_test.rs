//! Liveness sweep tests.

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use sl_core::config::Config;
use sl_core::scheduler::{Coordinator, Scheduler};
use sl_core::types::{TaskDescriptor, TaskId, TaskStatus, WorkerId, WorkerStatus};
use sl_daemon::patrol::run_sweep_at;

fn scheduler() -> Scheduler {
    Scheduler::new(Coordinator::new(&Config::default()))
}

fn descriptor(id: &str, file: &str) -> TaskDescriptor {
    let mut desc = TaskDescriptor::new(id, format!("task {id}"));
    desc.estimated_files = BTreeSet::from([file.to_string()]);
    desc
}

#[tokio::test]
async fn sweep_reclaims_task_from_silent_worker() {
    let scheduler = scheduler();
    scheduler
        .ingest_descriptors(vec![descriptor("t1", "src/a.rs")])
        .await
        .unwrap();
    let w1 = WorkerId::from("w1");
    let assignment = scheduler.request_work(&w1, None).await;
    assert_eq!(assignment.task.unwrap().id, TaskId::from("t1"));

    let later = Utc::now() + Duration::seconds(301);
    let report = run_sweep_at(&scheduler, later).await;
    assert_eq!(report.reclaimed, vec![(w1.clone(), TaskId::from("t1"))]);
    assert_eq!(report.stopped, vec![w1.clone()]);

    let task = scheduler.task(&TaskId::from("t1")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.assigned_worker, None);
    assert_eq!(task.retry_count, 0);

    let status = scheduler.status().await;
    assert_eq!(status.locks_held, 0);
    let worker = status.workers.iter().find(|w| w.id == w1).unwrap();
    assert_eq!(worker.status, WorkerStatus::Stopped);
}

#[tokio::test]
async fn sweep_leaves_live_workers_alone() {
    let scheduler = scheduler();
    scheduler
        .ingest_descriptors(vec![descriptor("t1", "src/a.rs")])
        .await
        .unwrap();
    let w1 = WorkerId::from("w1");
    scheduler.request_work(&w1, None).await;

    let report = run_sweep_at(&scheduler, Utc::now() + Duration::seconds(10)).await;
    assert!(report.is_empty());
    let task = scheduler.task(&TaskId::from("t1")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Assigned);
}

#[tokio::test]
async fn reclaimed_task_goes_to_another_worker() {
    let scheduler = scheduler();
    scheduler
        .ingest_descriptors(vec![descriptor("t1", "src/a.rs")])
        .await
        .unwrap();
    scheduler.request_work(&WorkerId::from("w1"), None).await;
    run_sweep_at(&scheduler, Utc::now() + Duration::seconds(301)).await;

    let assignment = scheduler
        .request_work(&WorkerId::from("w2"), None)
        .await;
    let task = assignment.task.unwrap();
    assert_eq!(task.id, TaskId::from("t1"));
    assert_eq!(task.assigned_worker, Some(WorkerId::from("w2")));
}
