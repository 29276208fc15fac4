//! Worker-side subcommands: request, start, report, release, heartbeat.

use std::collections::BTreeSet;

use sl_api_types::{HeartbeatRequest, ReportRequest, ReportResponse, TaskClaim, WorkRequest, WorkResponse};
use sl_core::types::{Outcome, Task, TaskId, Worker, WorkerId};

use super::ApiClient;

pub async fn request(
    api: &ApiClient,
    worker_id: &str,
    specialization: Vec<String>,
) -> anyhow::Result<WorkResponse> {
    let specialization: BTreeSet<String> = specialization.into_iter().collect();
    let body = WorkRequest {
        worker_id: WorkerId::from(worker_id),
        specialization: (!specialization.is_empty()).then_some(specialization),
    };
    let resp: WorkResponse = api.post(&["work", "request"], &body).await?;

    match &resp.task {
        Some(task) => {
            println!("Assigned {} to {worker_id}: {}", task.id, task.title);
            print_files(task);
        }
        None if resp.blocked => println!(
            "Admission blocked: {}. Retry in {}s.",
            resp.reason.as_deref().unwrap_or("no reason given"),
            resp.poll_backoff_secs
        ),
        None => println!(
            "No work available ({}). Retry in {}s.",
            resp.reason.as_deref().unwrap_or("queue empty"),
            resp.poll_backoff_secs
        ),
    }
    Ok(resp)
}

fn print_files(task: &Task) {
    if !task.estimated_files.is_empty() {
        println!("  files:");
        for file in &task.estimated_files {
            println!("    {file}");
        }
    }
}

fn claim(worker_id: &str, task_id: &str) -> TaskClaim {
    TaskClaim {
        worker_id: WorkerId::from(worker_id),
        task_id: TaskId::from(task_id),
    }
}

pub async fn start(api: &ApiClient, worker_id: &str, task_id: &str) -> anyhow::Result<Task> {
    let task: Task = api.post(&["work", "start"], &claim(worker_id, task_id)).await?;
    println!("Task {} is {}.", task.id, task.status);
    Ok(task)
}

pub async fn report(
    api: &ApiClient,
    worker_id: &str,
    task_id: &str,
    outcome: Outcome,
    detail: Option<String>,
) -> anyhow::Result<ReportResponse> {
    let body = ReportRequest {
        worker_id: WorkerId::from(worker_id),
        task_id: TaskId::from(task_id),
        outcome,
        detail,
    };
    let resp: ReportResponse = api.post(&["work", "report"], &body).await?;
    if resp.changed {
        println!(
            "Reported {} for {}; task is now {} (retries: {}).",
            outcome.as_str(),
            resp.task.id,
            resp.task.status,
            resp.task.retry_count
        );
    } else {
        println!("Report for {} was already recorded.", resp.task.id);
    }
    Ok(resp)
}

pub async fn release(api: &ApiClient, worker_id: &str, task_id: &str) -> anyhow::Result<ReportResponse> {
    let resp: ReportResponse = api.post(&["work", "release"], &claim(worker_id, task_id)).await?;
    println!("Released {}; task is now {}.", resp.task.id, resp.task.status);
    Ok(resp)
}

pub async fn heartbeat(api: &ApiClient, worker_id: &str, task_id: Option<&str>) -> anyhow::Result<Worker> {
    let body = HeartbeatRequest {
        worker_id: WorkerId::from(worker_id),
        task_id: task_id.map(TaskId::from),
    };
    let worker: Worker = api.post(&["heartbeat"], &body).await?;
    println!("Heartbeat recorded for {} ({:?}).", worker.id, worker.status);
    Ok(worker)
}
