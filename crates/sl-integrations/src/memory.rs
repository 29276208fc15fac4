use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sl_core::types::{TaskDescriptor, TaskId};

use crate::backlog::Backlog;
use crate::types::{BacklogError, LabelFilter, Result};

#[derive(Debug)]
struct Item {
    descriptor: TaskDescriptor,
    labels: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<TaskId, Item>,
    comments: Vec<(TaskId, String)>,
    fail_writes: bool,
}

/// In-process backlog for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryBacklog {
    state: Mutex<State>,
}

impl MemoryBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace an item. Its labels start as `descriptor.labels`.
    pub fn insert(&self, descriptor: TaskDescriptor) {
        let labels = descriptor.labels.iter().cloned().collect();
        self.state()
            .items
            .insert(descriptor.id.clone(), Item { descriptor, labels });
    }

    pub fn labels(&self, task_id: &TaskId) -> BTreeSet<String> {
        self.state()
            .items
            .get(task_id)
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    pub fn comments(&self, task_id: &TaskId) -> Vec<String> {
        self.state()
            .comments
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Make every label or comment write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }
}

#[async_trait]
impl Backlog for MemoryBacklog {
    async fn fetch_candidate_tasks(&self, filter: &LabelFilter) -> Result<Vec<TaskDescriptor>> {
        let state = self.state();
        Ok(state
            .items
            .values()
            .filter(|item| filter.matches(&item.labels.iter().collect::<Vec<_>>()))
            .map(|item| {
                let mut desc = item.descriptor.clone();
                desc.labels = item.labels.iter().cloned().collect();
                desc
            })
            .collect())
    }

    async fn update_labels(&self, task_id: &TaskId, add: &[String], remove: &[String]) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(BacklogError::Unavailable("writes disabled".to_string()));
        }
        let item = state
            .items
            .get_mut(task_id)
            .ok_or_else(|| BacklogError::NotFound(task_id.to_string()))?;
        item.labels.extend(add.iter().cloned());
        for label in remove {
            item.labels.remove(label);
        }
        Ok(())
    }

    async fn post_comment(&self, task_id: &TaskId, text: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(BacklogError::Unavailable("writes disabled".to_string()));
        }
        if !state.items.contains_key(task_id) {
            return Err(BacklogError::NotFound(task_id.to_string()));
        }
        state.comments.push((task_id.clone(), text.to_string()));
        Ok(())
    }
}
