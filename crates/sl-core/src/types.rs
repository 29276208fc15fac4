use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable task identifier, derived from the backlog item (e.g. `owner/repo#42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Priority / TaskSize
// ---------------------------------------------------------------------------

/// Task priority. `P0` is the most urgent; the derived ordering sorts it first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSize {
    Small,
    #[default]
    Medium,
    Large,
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Returns `true` when a transition from `self` to `target` is a legal edge.
    pub fn can_transition_to(&self, target: &TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Queued, TaskStatus::Assigned)
                | (TaskStatus::Assigned, TaskStatus::InProgress)
                | (TaskStatus::Assigned, TaskStatus::Queued)
                | (TaskStatus::InProgress, TaskStatus::Queued)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Assigned or in progress: the task is bound to a worker and holds locks.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskDescriptor
// ---------------------------------------------------------------------------

/// A backlog item as the backlog collaborator sees it, before ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub size: TaskSize,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    #[serde(default)]
    pub estimated_files: BTreeSet<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            priority: Priority::default(),
            size: TaskSize::default(),
            dependencies: BTreeSet::new(),
            estimated_files: BTreeSet::new(),
            repository: None,
            labels: Vec::new(),
            tags: BTreeSet::new(),
            created_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub size: TaskSize,
    pub dependencies: BTreeSet<TaskId>,
    /// Path patterns the task is expected to touch. Filled in at ingestion.
    pub estimated_files: BTreeSet<String>,
    pub repository: Option<String>,
    pub tags: BTreeSet<String>,
    pub labels: Vec<String>,
    pub status: TaskStatus,
    pub assigned_worker: Option<WorkerId>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Monotonic ingestion order; breaks `created_at` ties.
    pub ingest_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            body: String::new(),
            priority: Priority::default(),
            size: TaskSize::default(),
            dependencies: BTreeSet::new(),
            estimated_files: BTreeSet::new(),
            repository: None,
            tags: BTreeSet::new(),
            labels: Vec::new(),
            status: TaskStatus::Queued,
            assigned_worker: None,
            retry_count: 0,
            last_error: None,
            ingest_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_descriptor(desc: TaskDescriptor, now: DateTime<Utc>) -> Self {
        let created_at = desc.created_at.unwrap_or(now);
        Self {
            id: desc.id,
            title: desc.title,
            body: desc.body,
            priority: desc.priority,
            size: desc.size,
            dependencies: desc.dependencies,
            estimated_files: desc.estimated_files,
            repository: desc.repository,
            tags: desc.tags,
            labels: desc.labels,
            status: TaskStatus::Queued,
            assigned_worker: None,
            retry_count: 0,
            last_error: None,
            ingest_seq: 0,
            created_at,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.estimated_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Blocked,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub current_task: Option<TaskId>,
    pub last_heartbeat: DateTime<Utc>,
    pub specialization: Option<BTreeSet<String>>,
    pub registered_at: DateTime<Utc>,
    pub tasks_completed: u64,
}

impl Worker {
    pub fn new(id: impl Into<WorkerId>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: WorkerStatus::Idle,
            current_task: None,
            last_heartbeat: now,
            specialization: None,
            registered_at: now,
            tasks_completed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Review units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    ChangesRequested,
    Approved,
    Merged,
    Closed,
}

impl ReviewState {
    /// Merged or closed units leave tracking.
    pub fn is_final(&self) -> bool {
        matches!(self, ReviewState::Merged | ReviewState::Closed)
    }
}

/// The proposed change a completed task produced, awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUnit {
    pub task_id: TaskId,
    pub state: ReviewState,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub pending_count: usize,
    pub changes_requested_count: usize,
    pub approved_count: usize,
    pub blocked: bool,
    pub blocking_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
    Released,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Released => "released",
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The dependency id is not known to the store.
    Unknown,
    /// The dependency reached terminal failure.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyWarning {
    pub task_id: TaskId,
    pub dependency: TaskId,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}
