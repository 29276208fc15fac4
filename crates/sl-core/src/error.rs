use crate::types::{TaskId, TaskStatus, WorkerId};

/// Integrity errors raised by the coordinator components.
///
/// Routine outcomes (lock conflicts, "no work", worker timeouts) are values,
/// not errors; see [`crate::conflict::LockOutcome`] and
/// [`crate::workers::SweepReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("task {0} already exists and is not terminal")]
    DuplicateTask(TaskId),

    #[error("dependency cycle: {}", format_cycle(.cycle))]
    DependencyCycle { cycle: Vec<TaskId> },

    #[error("invalid transition for task {task_id}: status is {current}, cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        current: TaskStatus,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {task_id} is not assigned to worker {worker_id}")]
    NotAssigned { task_id: TaskId, worker_id: WorkerId },

    #[error("task {task_id} is still {status}")]
    TaskActive { task_id: TaskId, status: TaskStatus },

    #[error("no review unit tracked for task {0}")]
    UnknownReviewUnit(TaskId),
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
