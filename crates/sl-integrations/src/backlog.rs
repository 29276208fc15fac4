use async_trait::async_trait;
use sl_core::types::{TaskDescriptor, TaskId};

use crate::types::{LabelFilter, Result};

/// Source of tasks and sink for their projected state.
///
/// Label and comment writes are best effort from the scheduler's point of
/// view: callers log failures and move on.
#[async_trait]
pub trait Backlog: Send + Sync {
    /// Open items that pass `filter`, parsed into descriptors.
    async fn fetch_candidate_tasks(&self, filter: &LabelFilter) -> Result<Vec<TaskDescriptor>>;

    /// Add then remove labels on the item behind `task_id`.
    async fn update_labels(&self, task_id: &TaskId, add: &[String], remove: &[String]) -> Result<()>;

    async fn post_comment(&self, task_id: &TaskId, text: &str) -> Result<()>;
}
