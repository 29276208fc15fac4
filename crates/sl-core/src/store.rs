use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::deps;
use crate::error::CoordinatorError;
use crate::types::{QueueCounts, Task, TaskId, TaskStatus, WorkerId};

/// Record of every task known to the coordinator and its lifecycle state.
///
/// All status changes go through [`TaskStore::transition`] or
/// [`TaskStore::transition_with`], which reject edges the lifecycle does not
/// allow and compare against the caller's expected current status.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    next_seq: u64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted records, keeping their status.
    pub fn restore(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut store = Self::new();
        for task in tasks {
            store.next_seq = store.next_seq.max(task.ingest_seq + 1);
            store.tasks.insert(task.id.clone(), task);
        }
        store
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Insert a single task as `queued`.
    pub fn ingest(&mut self, task: Task) -> Result<TaskId, CoordinatorError> {
        let mut ids = self.ingest_all(vec![task])?;
        Ok(ids.remove(0))
    }

    /// Insert a batch of tasks as `queued`, all or nothing.
    ///
    /// Fails with `DuplicateTask` if any id is already present and not
    /// terminal (or appears twice in the batch), and with `DependencyCycle`
    /// if the batch closes a cycle with itself or with stored tasks. A
    /// terminal record with the same id is replaced.
    pub fn ingest_all(&mut self, tasks: Vec<Task>) -> Result<Vec<TaskId>, CoordinatorError> {
        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.id.clone()) {
                return Err(CoordinatorError::DuplicateTask(task.id.clone()));
            }
            if let Some(existing) = self.tasks.get(&task.id) {
                if !existing.status.is_terminal() {
                    return Err(CoordinatorError::DuplicateTask(task.id.clone()));
                }
            }
        }

        let batch: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
        let deps_of = |id: &TaskId| -> Vec<TaskId> {
            match batch.get(id) {
                Some(task) => task.dependencies.iter().cloned().collect(),
                None => self
                    .tasks
                    .get(id)
                    .map(|t| t.dependencies.iter().cloned().collect())
                    .unwrap_or_default(),
            }
        };
        if let Some(cycle) = deps::find_cycle(tasks.iter().map(|t| &t.id), &deps_of) {
            return Err(CoordinatorError::DependencyCycle { cycle });
        }

        let mut ids = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            task.status = TaskStatus::Queued;
            task.assigned_worker = None;
            task.retry_count = 0;
            task.last_error = None;
            task.ingest_seq = self.next_seq;
            self.next_seq += 1;
            ids.push(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }
        Ok(ids)
    }

    /// Move `id` from `from` to `to`.
    pub fn transition(
        &mut self,
        id: &TaskId,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<&Task, CoordinatorError> {
        self.transition_with(id, from, to, now, |_| {})
    }

    /// Move `id` from `from` to `to`, applying `update` to the record in the
    /// same step. `update` only runs when the transition is legal.
    pub fn transition_with<F>(
        &mut self,
        id: &TaskId,
        from: TaskStatus,
        to: TaskStatus,
        now: DateTime<Utc>,
        update: F,
    ) -> Result<&Task, CoordinatorError>
    where
        F: FnOnce(&mut Task),
    {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))?;
        if task.status != from || !from.can_transition_to(&to) {
            return Err(CoordinatorError::InvalidTransition {
                task_id: id.clone(),
                current: task.status,
                from,
                to,
            });
        }
        task.status = to;
        task.updated_at = now;
        update(task);
        Ok(task)
    }

    /// Snapshot of the queued tasks in ingestion order.
    pub fn list_queued(&self) -> Vec<Task> {
        let mut queued: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by_key(|t| t.ingest_seq);
        queued
    }

    /// All tasks ordered by ingestion.
    pub fn list(&self) -> Vec<Task> {
        let mut all: Vec<Task> = self.tasks.values().cloned().collect();
        all.sort_by_key(|t| t.ingest_seq);
        all
    }

    /// The active (assigned or in-progress) task bound to `worker`, if any.
    pub fn active_for_worker(&self, worker: &WorkerId) -> Option<&Task> {
        self.tasks
            .values()
            .find(|t| t.status.is_active() && t.assigned_worker.as_ref() == Some(worker))
    }

    pub fn active(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(|t| t.status.is_active())
    }

    /// Remove a terminal task from the store.
    pub fn archive(&mut self, id: &TaskId) -> Result<Task, CoordinatorError> {
        let status = self
            .tasks
            .get(id)
            .map(|t| t.status)
            .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))?;
        if !status.is_terminal() {
            return Err(CoordinatorError::TaskActive {
                task_id: id.clone(),
                status,
            });
        }
        self.tasks
            .remove(id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(id.clone()))
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Queued => counts.queued += 1,
                TaskStatus::Assigned => counts.assigned += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
