use sl_api_types::StatusResponse;

use super::ApiClient;

pub async fn fetch(api: &ApiClient) -> anyhow::Result<StatusResponse> {
    api.get(&["status"]).await
}

/// Run the `status` subcommand: admission state, queue counts and workers.
pub async fn run(api: &ApiClient) -> anyhow::Result<()> {
    let status = fetch(api).await?;
    print!("{}", render(&status));
    Ok(())
}

pub fn render(status: &StatusResponse) -> String {
    let mut out = String::new();
    let admission = if status.blocked {
        format!(
            "BLOCKED ({})",
            status.blocking_reason.as_deref().unwrap_or("no reason given")
        )
    } else {
        "open".to_string()
    };
    out.push_str(&format!("sluice status  (admission: {admission})\n"));
    out.push_str(&format!("{}\n", "-".repeat(40)));
    out.push_str(&format!("Review units pending:    {}\n", status.pending_count));
    out.push_str(&format!("  changes requested:     {}\n", status.changes_requested_count));
    out.push_str(&format!("  approved:              {}\n", status.approved_count));
    out.push_str(&format!("Tasks queued:            {}\n", status.queue.queued));
    out.push_str(&format!("  assigned:              {}\n", status.queue.assigned));
    out.push_str(&format!("  in progress:           {}\n", status.queue.in_progress));
    out.push_str(&format!("  completed:             {}\n", status.queue.completed));
    out.push_str(&format!("  failed:                {}\n", status.queue.failed));
    out.push_str(&format!("Locks held:              {}\n", status.locks_held));
    out.push_str(&format!("Workers:                 {}\n", status.workers.len()));
    for worker in &status.workers {
        let task = worker
            .current_task
            .as_ref()
            .map(|t| format!(" on {t}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:<20} {:?}{task}  (last seen {})\n",
            worker.id.to_string(),
            worker.status,
            worker.last_heartbeat.format("%H:%M:%S")
        ));
    }
    if !status.dependency_warnings.is_empty() {
        out.push_str("Dependency warnings:\n");
        for warning in &status.dependency_warnings {
            out.push_str(&format!(
                "  {} depends on {} ({:?})\n",
                warning.task_id, warning.dependency, warning.kind
            ));
        }
    }
    out
}
