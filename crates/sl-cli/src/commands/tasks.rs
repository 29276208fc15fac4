//! Operator subcommands over the task store.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sl_api_types::{IngestRequest, IngestResponse};
use sl_core::types::{Task, TaskDescriptor, TaskStatus};

use super::ApiClient;

/// An ingest file holds either a bare array of descriptors or `{"tasks": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IngestFile {
    Batch(IngestRequest),
    List(Vec<TaskDescriptor>),
}

pub fn read_descriptors(path: &Path) -> anyhow::Result<Vec<TaskDescriptor>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: IngestFile = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a task list", path.display()))?;
    Ok(match file {
        IngestFile::Batch(batch) => batch.tasks,
        IngestFile::List(tasks) => tasks,
    })
}

/// Ingest the batch in `path`, all or nothing.
pub async fn ingest(api: &ApiClient, path: &Path) -> anyhow::Result<IngestResponse> {
    let tasks = read_descriptors(path)?;
    if tasks.is_empty() {
        anyhow::bail!("{} contains no tasks", path.display());
    }
    let resp: IngestResponse = api.post(&["tasks"], &IngestRequest { tasks }).await?;
    println!("Ingested {} task(s):", resp.ingested.len());
    for id in &resp.ingested {
        println!("  {id}");
    }
    Ok(resp)
}

pub async fn list(api: &ApiClient, status: Option<TaskStatus>) -> anyhow::Result<Vec<Task>> {
    let mut url = api.url(&["tasks"])?;
    if let Some(status) = status {
        url.query_pairs_mut().append_pair("status", status.as_str());
    }
    let tasks: Vec<Task> = api.get_url(url).await?;
    print!("{}", render_table(&tasks));
    Ok(tasks)
}

pub fn render_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks.\n".to_string();
    }
    let mut out = format!("{:<24} {:<12} {:<4} {:<12} {}\n", "ID", "STATUS", "PRI", "WORKER", "TITLE");
    for task in tasks {
        let worker = task
            .assigned_worker
            .as_ref()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<24} {:<12} {:<4} {:<12} {}\n",
            task.id.to_string(),
            task.status.as_str(),
            format!("{:?}", task.priority),
            worker,
            task.title
        ));
    }
    out
}

pub async fn show(api: &ApiClient, task_id: &str) -> anyhow::Result<Task> {
    let task: Task = api.get(&["tasks", task_id]).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(task)
}

/// Drop a completed or failed task from the store.
pub async fn archive(api: &ApiClient, task_id: &str) -> anyhow::Result<Task> {
    let task: Task = api.delete(&["tasks", task_id]).await?;
    println!("Archived {} ({}).", task.id, task.status);
    Ok(task)
}
