//! Projection of committed scheduler events onto backlog labels and
//! comments.
//!
//! Labels are an outward view of coordinator state. Nothing read back from
//! them ever changes a task.

use sl_core::config::BacklogConfig;
use sl_core::events::SchedulerEvent;
use sl_core::types::TaskId;

use crate::backlog::Backlog;

/// Label names the projection writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelScheme {
    pub ready: String,
    pub in_progress: String,
    pub completed: String,
    pub failed: String,
}

impl From<&BacklogConfig> for LabelScheme {
    fn from(config: &BacklogConfig) -> Self {
        Self {
            ready: config.ready_label.clone(),
            in_progress: config.in_progress_label.clone(),
            completed: config.completed_label.clone(),
            failed: config.failed_label.clone(),
        }
    }
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self::from(&BacklogConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacklogAction {
    Labels {
        task_id: TaskId,
        add: Vec<String>,
        remove: Vec<String>,
    },
    Comment {
        task_id: TaskId,
        text: String,
    },
}

impl BacklogAction {
    pub fn task_id(&self) -> &TaskId {
        match self {
            BacklogAction::Labels { task_id, .. } | BacklogAction::Comment { task_id, .. } => task_id,
        }
    }
}

fn labels(task_id: &TaskId, add: &str, remove: &str) -> BacklogAction {
    BacklogAction::Labels {
        task_id: task_id.clone(),
        add: vec![add.to_string()],
        remove: vec![remove.to_string()],
    }
}

fn comment(task_id: &TaskId, text: String) -> BacklogAction {
    BacklogAction::Comment {
        task_id: task_id.clone(),
        text,
    }
}

/// Backlog writes that mirror `event`. Most events need none.
pub fn plan(event: &SchedulerEvent, scheme: &LabelScheme) -> Vec<BacklogAction> {
    match event {
        SchedulerEvent::TaskAssigned { task_id, .. } => {
            vec![labels(task_id, &scheme.in_progress, &scheme.ready)]
        }
        SchedulerEvent::TaskCompleted {
            task_id,
            worker_id,
            url,
        } => {
            let text = match url {
                Some(url) => format!("Completed by worker `{worker_id}`. Review: {url}"),
                None => format!("Completed by worker `{worker_id}`."),
            };
            vec![
                labels(task_id, &scheme.completed, &scheme.in_progress),
                comment(task_id, text),
            ]
        }
        SchedulerEvent::TaskRequeued {
            task_id,
            retry_count,
            error,
            ..
        } => {
            let reason = error.as_deref().unwrap_or("no detail given");
            vec![
                labels(task_id, &scheme.ready, &scheme.in_progress),
                comment(
                    task_id,
                    format!("Attempt {retry_count} failed: {reason}. Returned to the queue."),
                ),
            ]
        }
        SchedulerEvent::TaskFailed {
            task_id,
            retry_count,
            error,
            ..
        } => {
            let reason = error.as_deref().unwrap_or("no detail given");
            vec![
                labels(task_id, &scheme.failed, &scheme.in_progress),
                comment(
                    task_id,
                    format!("Failed after {retry_count} attempts: {reason}"),
                ),
            ]
        }
        SchedulerEvent::TaskReleased {
            task_id,
            worker_id,
            reclaimed,
        } => {
            let mut actions = vec![labels(task_id, &scheme.ready, &scheme.in_progress)];
            if *reclaimed {
                actions.push(comment(
                    task_id,
                    format!("Worker `{worker_id}` stopped responding. Returned to the queue."),
                ));
            }
            actions
        }
        SchedulerEvent::TaskIngested { .. }
        | SchedulerEvent::TaskStarted { .. }
        | SchedulerEvent::TaskArchived { .. }
        | SchedulerEvent::ReviewUpdated { .. }
        | SchedulerEvent::WorkerStopped { .. } => Vec::new(),
    }
}

/// Run `actions` against `backlog`. Failures are logged and skipped;
/// returns how many failed.
pub async fn apply(backlog: &dyn Backlog, actions: &[BacklogAction]) -> usize {
    let mut failed = 0;
    for action in actions {
        let result = match action {
            BacklogAction::Labels {
                task_id,
                add,
                remove,
            } => backlog.update_labels(task_id, add, remove).await,
            BacklogAction::Comment { task_id, text } => backlog.post_comment(task_id, text).await,
        };
        if let Err(err) = result {
            failed += 1;
            tracing::warn!(task_id = %action.task_id(), error = %err, "backlog projection failed");
        }
    }
    failed
}
