//! The single serialization point for every state change.
//!
//! [`Coordinator`] is the synchronous state machine that owns the task
//! store, the lock table, the admission controller and the worker registry.
//! [`Scheduler`] wraps it in one `tokio::sync::Mutex`, writes changed records
//! to the journal and publishes events after each operation commits.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::admission::AdmissionController;
use crate::cache::CacheDb;
use crate::config::{Config, MAX_DURATION_SECS};
use crate::conflict::{ConflictResolver, FileEstimator, LockOutcome, PathMentionEstimator};
use crate::deps;
use crate::error::CoordinatorError;
use crate::events::{EventBus, SchedulerEvent};
use crate::store::TaskStore;
use crate::types::{
    AdmissionStatus, DependencyWarning, Outcome, QueueCounts, ReviewState, ReviewUnit, Task,
    TaskDescriptor, TaskId, TaskStatus, Worker, WorkerId, WorkerStatus,
};
use crate::workers::{SweepReport, WorkerRegistry};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Answer to a work request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub task: Option<Task>,
    pub blocked: bool,
    pub reason: Option<String>,
    /// Candidates passed over because their files were locked.
    pub conflicts_skipped: usize,
}

impl WorkAssignment {
    fn assigned(task: Task, conflicts_skipped: usize) -> Self {
        Self {
            task: Some(task),
            blocked: false,
            reason: None,
            conflicts_skipped,
        }
    }

    fn none(admission: AdmissionStatus, conflicts_skipped: usize) -> Self {
        Self {
            task: None,
            blocked: admission.blocked,
            reason: admission.blocking_reason,
            conflicts_skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub task: Task,
    /// `false` when the report repeated one already applied.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub admission: AdmissionStatus,
    pub queue: QueueCounts,
    pub workers: Vec<Worker>,
    pub review_units: Vec<ReviewUnit>,
    pub dependency_warnings: Vec<DependencyWarning>,
    pub locks_held: usize,
}

/// Records touched since the last commit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Changes {
    pub tasks: BTreeSet<TaskId>,
    pub workers: BTreeSet<WorkerId>,
    pub review_units: BTreeSet<TaskId>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.workers.is_empty() && self.review_units.is_empty()
    }
}

/// Seconds from config as a duration, clamped to the largest accepted value.
fn bounded_seconds(secs: u64) -> Duration {
    let max = Duration::seconds(MAX_DURATION_SECS as i64);
    i64::try_from(secs.min(MAX_DURATION_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(max)
}

fn matches_specialization(task: &Task, filter: Option<&BTreeSet<String>>) -> bool {
    match filter {
        Some(tags) if !tags.is_empty() => task.tags.iter().any(|t| tags.contains(t)),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Coordinator {
    max_retries: u32,
    store: TaskStore,
    conflicts: ConflictResolver,
    admission: AdmissionController,
    workers: WorkerRegistry,
    events: Vec<SchedulerEvent>,
    changes: Changes,
}

impl Coordinator {
    pub fn new(config: &Config) -> Self {
        Self {
            max_retries: config.scheduler.max_retries,
            store: TaskStore::new(),
            conflicts: ConflictResolver::new(
                Arc::new(PathMentionEstimator),
                config.scheduler.lock_repository_when_unknown,
            ),
            admission: AdmissionController::new(config.admission.clone()),
            workers: WorkerRegistry::new(
                bounded_seconds(config.workers.worker_timeout_secs),
                bounded_seconds(config.workers.worker_retention_secs),
            ),
            events: Vec::new(),
            changes: Changes::default(),
        }
    }

    /// Rebuild from journaled records. Active tasks take their locks back.
    pub fn restore(
        config: &Config,
        tasks: Vec<Task>,
        workers: Vec<Worker>,
        units: Vec<ReviewUnit>,
    ) -> Self {
        let mut coordinator = Self::new(config);
        coordinator.store = TaskStore::restore(tasks);
        coordinator.workers.restore(workers);
        coordinator.admission = AdmissionController::restore(config.admission.clone(), units);
        let active: Vec<Task> = coordinator.store.active().cloned().collect();
        for task in active {
            if let LockOutcome::Conflict { holding_tasks } = coordinator.conflicts.try_lock(&task) {
                tracing::warn!(
                    task_id = %task.id,
                    holders = ?holding_tasks,
                    "restored active task overlaps another active task"
                );
            }
        }
        coordinator
    }

    /// Replace the file estimation strategy.
    pub fn with_estimator(mut self, estimator: Arc<dyn FileEstimator>, lock_repository_when_unknown: bool) -> Self {
        self.conflicts = ConflictResolver::new(estimator, lock_repository_when_unknown);
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    /// Events and touched records accumulated since the last call.
    pub fn take_changes(&mut self) -> (Vec<SchedulerEvent>, Changes) {
        (
            std::mem::take(&mut self.events),
            std::mem::take(&mut self.changes),
        )
    }

    fn touch_worker(&mut self, worker_id: &WorkerId, now: DateTime<Utc>) {
        self.workers.touch(worker_id, None, now);
        self.changes.workers.insert(worker_id.clone());
    }

    fn set_worker(&mut self, worker_id: &WorkerId, status: WorkerStatus, task: Option<TaskId>) {
        self.workers.set_status(worker_id, status, task);
        self.changes.workers.insert(worker_id.clone());
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Estimate files for each task and insert the batch, all or nothing.
    pub fn ingest(&mut self, tasks: Vec<Task>, now: DateTime<Utc>) -> Result<Vec<TaskId>, CoordinatorError> {
        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|mut task| {
                task.estimated_files = self.conflicts.estimate_files(&task);
                task.updated_at = now;
                task
            })
            .collect();
        let ids = self.store.ingest_all(tasks)?;

        for id in &ids {
            self.changes.tasks.insert(id.clone());
            self.events.push(SchedulerEvent::TaskIngested { task_id: id.clone() });
        }
        for warning in deps::dependency_warnings(&self.store) {
            if ids.contains(&warning.task_id) {
                tracing::warn!(
                    task_id = %warning.task_id,
                    dependency = %warning.dependency,
                    kind = ?warning.kind,
                    "task depends on a task that cannot complete"
                );
            }
        }
        tracing::info!(count = ids.len(), "ingested tasks");
        Ok(ids)
    }

    pub fn ingest_descriptors(
        &mut self,
        descriptors: Vec<TaskDescriptor>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, CoordinatorError> {
        let tasks = descriptors
            .into_iter()
            .map(|d| Task::from_descriptor(d, now))
            .collect();
        self.ingest(tasks, now)
    }

    /// Drop a terminal task.
    pub fn archive(&mut self, task_id: &TaskId) -> Result<Task, CoordinatorError> {
        let task = self.store.archive(task_id)?;
        self.conflicts.release(task_id);
        self.changes.tasks.insert(task_id.clone());
        self.events.push(SchedulerEvent::TaskArchived {
            task_id: task_id.clone(),
        });
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Hand `worker_id` the best runnable task, or explain why there is none.
    ///
    /// A worker that already holds an active task gets that task back, so a
    /// retried request never yields a second assignment.
    pub fn request_work(
        &mut self,
        worker_id: &WorkerId,
        specialization: Option<BTreeSet<String>>,
        now: DateTime<Utc>,
    ) -> WorkAssignment {
        let filter = self
            .workers
            .touch(worker_id, specialization, now)
            .specialization
            .clone();
        self.changes.workers.insert(worker_id.clone());

        if let Some(task) = self.store.active_for_worker(worker_id) {
            tracing::debug!(worker_id = %worker_id, task_id = %task.id, "worker already holds a task");
            return WorkAssignment::assigned(task.clone(), 0);
        }

        let admission = self.admission.status();
        let partial = self.admission.config().allow_parallel_independent;
        if admission.blocked && !partial {
            tracing::debug!(worker_id = %worker_id, "admission blocked");
            self.set_worker(worker_id, WorkerStatus::Blocked, None);
            return WorkAssignment::none(admission, 0);
        }

        let mut candidates: Vec<Task> = self
            .store
            .list_queued()
            .into_iter()
            .filter(|t| deps::is_eligible(t, &self.store))
            .filter(|t| matches_specialization(t, filter.as_ref()))
            .collect();
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.ingest_seq.cmp(&b.ingest_seq))
        });

        let mut conflicts_skipped = 0;
        for candidate in candidates {
            if admission.blocked && self
                    .admission
                    .status_for(&candidate, &self.store, &self.conflicts)
                    .blocked {
                continue;
            }
            if let LockOutcome::Conflict { holding_tasks } = self.conflicts.try_lock(&candidate) {
                tracing::debug!(
                    task_id = %candidate.id,
                    holders = ?holding_tasks,
                    "file conflict, skipping candidate"
                );
                conflicts_skipped += 1;
                continue;
            }
            let assigned = self
                .store
                .transition_with(&candidate.id, TaskStatus::Queued, TaskStatus::Assigned, now, |t| {
                    t.assigned_worker = Some(worker_id.clone());
                })
                .cloned();
            match assigned {
                Ok(task) => {
                    self.changes.tasks.insert(task.id.clone());
                    self.set_worker(worker_id, WorkerStatus::Busy, Some(task.id.clone()));
                    self.events.push(SchedulerEvent::TaskAssigned {
                        task_id: task.id.clone(),
                        worker_id: worker_id.clone(),
                    });
                    tracing::info!(worker_id = %worker_id, task_id = %task.id, "assigned task");
                    return WorkAssignment::assigned(task, conflicts_skipped);
                }
                Err(err) => {
                    self.conflicts.release(&candidate.id);
                    tracing::warn!(task_id = %candidate.id, error = %err, "could not assign candidate");
                }
            }
        }

        let status = if admission.blocked {
            WorkerStatus::Blocked
        } else {
            WorkerStatus::Idle
        };
        self.set_worker(worker_id, status, None);
        WorkAssignment::none(admission, conflicts_skipped)
    }

    /// `assigned -> in_progress` for the worker holding the task.
    pub fn start_work(
        &mut self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<Task, CoordinatorError> {
        self.touch_worker(worker_id, now);
        let task = self
            .store
            .get(task_id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.clone()))?;
        if task.assigned_worker.as_ref() != Some(worker_id) {
            return Err(CoordinatorError::NotAssigned {
                task_id: task_id.clone(),
                worker_id: worker_id.clone(),
            });
        }
        if task.status == TaskStatus::InProgress {
            return Ok(task.clone());
        }
        let task = self
            .store
            .transition(task_id, TaskStatus::Assigned, TaskStatus::InProgress, now)?
            .clone();
        self.changes.tasks.insert(task_id.clone());
        self.events.push(SchedulerEvent::TaskStarted {
            task_id: task_id.clone(),
            worker_id: worker_id.clone(),
        });
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Apply a worker's outcome report. Repeating a report already applied
    /// is a no-op.
    pub fn report_outcome(
        &mut self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        outcome: Outcome,
        detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<OutcomeReport, CoordinatorError> {
        self.touch_worker(worker_id, now);
        let current = self
            .store
            .get(task_id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.clone()))?;

        let already_applied = match outcome {
            Outcome::Completed => current.status == TaskStatus::Completed,
            Outcome::Failed => matches!(current.status, TaskStatus::Failed | TaskStatus::Queued),
            Outcome::Released => current.status == TaskStatus::Queued,
        };
        if already_applied {
            tracing::debug!(task_id = %task_id, outcome = outcome.as_str(), "duplicate outcome report");
            return Ok(OutcomeReport {
                task: current.clone(),
                changed: false,
            });
        }
        if current.assigned_worker.as_ref() != Some(worker_id) {
            tracing::warn!(
                task_id = %task_id,
                worker_id = %worker_id,
                holder = ?current.assigned_worker,
                "outcome reported by a worker that does not hold the task"
            );
            return Err(CoordinatorError::NotAssigned {
                task_id: task_id.clone(),
                worker_id: worker_id.clone(),
            });
        }
        let status = current.status;
        let retry_count = current.retry_count;

        let task = match outcome {
            Outcome::Completed => {
                self.promote_if_assigned(task_id, status, now)?;
                let task = self
                    .store
                    .transition(task_id, TaskStatus::InProgress, TaskStatus::Completed, now)?
                    .clone();
                self.conflicts.release(task_id);
                self.admission.register(task_id.clone(), detail.clone(), now);
                self.changes.review_units.insert(task_id.clone());
                if let Some(worker) = self.workers.get_mut(worker_id) {
                    worker.tasks_completed += 1;
                }
                self.events.push(SchedulerEvent::TaskCompleted {
                    task_id: task_id.clone(),
                    worker_id: worker_id.clone(),
                    url: detail,
                });
                tracing::info!(task_id = %task_id, worker_id = %worker_id, "task completed");
                task
            }
            Outcome::Failed => {
                self.promote_if_assigned(task_id, status, now)?;
                let retries = retry_count + 1;
                let terminal = retries >= self.max_retries;
                let to = if terminal {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Queued
                };
                let error = detail.clone();
                let task = self
                    .store
                    .transition_with(task_id, TaskStatus::InProgress, to, now, |t| {
                        t.retry_count = retries;
                        t.last_error = error;
                        if !terminal {
                            t.assigned_worker = None;
                        }
                    })?
                    .clone();
                self.conflicts.release(task_id);
                let event = if terminal {
                    tracing::warn!(task_id = %task_id, retries, "task failed permanently");
                    SchedulerEvent::TaskFailed {
                        task_id: task_id.clone(),
                        worker_id: worker_id.clone(),
                        retry_count: retries,
                        error: detail,
                    }
                } else {
                    tracing::info!(task_id = %task_id, retries, "task failed, requeued");
                    SchedulerEvent::TaskRequeued {
                        task_id: task_id.clone(),
                        worker_id: worker_id.clone(),
                        retry_count: retries,
                        error: detail,
                    }
                };
                self.events.push(event);
                task
            }
            Outcome::Released => self.release_to_queue(task_id, worker_id, false, now)?,
        };

        self.changes.tasks.insert(task_id.clone());
        self.set_worker(worker_id, WorkerStatus::Idle, None);
        Ok(OutcomeReport {
            task,
            changed: true,
        })
    }

    fn promote_if_assigned(
        &mut self,
        task_id: &TaskId,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), CoordinatorError> {
        if status == TaskStatus::Assigned {
            self.store
                .transition(task_id, TaskStatus::Assigned, TaskStatus::InProgress, now)?;
        }
        Ok(())
    }

    /// Return an active task to the queue without counting a retry.
    fn release_to_queue(
        &mut self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        reclaimed: bool,
        now: DateTime<Utc>,
    ) -> Result<Task, CoordinatorError> {
        let status = self
            .store
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.clone()))?;
        let task = self
            .store
            .transition_with(task_id, status, TaskStatus::Queued, now, |t| {
                t.assigned_worker = None;
            })?
            .clone();
        self.conflicts.release(task_id);
        self.changes.tasks.insert(task_id.clone());
        self.events.push(SchedulerEvent::TaskReleased {
            task_id: task_id.clone(),
            worker_id: worker_id.clone(),
            reclaimed,
        });
        tracing::info!(task_id = %task_id, worker_id = %worker_id, reclaimed, "task returned to queue");
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Record a heartbeat. Naming an assigned task also starts it.
    pub fn heartbeat(
        &mut self,
        worker_id: &WorkerId,
        task_id: Option<&TaskId>,
        now: DateTime<Utc>,
    ) -> Worker {
        self.touch_worker(worker_id, now);
        if let Some(task_id) = task_id {
            let startable = self.store.get(task_id).is_some_and(|t| {
                t.status == TaskStatus::Assigned && t.assigned_worker.as_ref() == Some(worker_id)
            });
            if startable {
                if let Err(err) = self.start_work(worker_id, task_id, now) {
                    tracing::warn!(task_id = %task_id, error = %err, "heartbeat could not start task");
                }
            }
        }
        self.workers
            .get(worker_id)
            .cloned()
            .unwrap_or_else(|| Worker::new(worker_id.clone(), now))
    }

    /// Reclaim tasks from timed-out workers and forget long-stopped ones.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for worker_id in self.workers.timed_out(now) {
            tracing::warn!(worker_id = %worker_id, "worker missed heartbeats, stopping");
            let held: Vec<TaskId> = self
                .store
                .active()
                .filter(|t| t.assigned_worker.as_ref() == Some(&worker_id))
                .map(|t| t.id.clone())
                .collect();
            for task_id in held {
                match self.release_to_queue(&task_id, &worker_id, true, now) {
                    Ok(_) => report.reclaimed.push((worker_id.clone(), task_id)),
                    Err(err) => tracing::warn!(task_id = %task_id, error = %err, "reclaim failed"),
                }
            }
            self.set_worker(&worker_id, WorkerStatus::Stopped, None);
            self.events.push(SchedulerEvent::WorkerStopped {
                worker_id: worker_id.clone(),
            });
            report.stopped.push(worker_id);
        }

        // Active tasks bound to workers the registry no longer knows.
        let timeout = self.workers.timeout();
        let orphans: Vec<(WorkerId, TaskId)> = self
            .store
            .active()
            .filter(|t| now - t.updated_at > timeout)
            .filter_map(|t| {
                let worker = t.assigned_worker.clone()?;
                (!self.workers.contains(&worker)).then(|| (worker, t.id.clone()))
            })
            .collect();
        for (worker_id, task_id) in orphans {
            match self.release_to_queue(&task_id, &worker_id, true, now) {
                Ok(_) => report.reclaimed.push((worker_id, task_id)),
                Err(err) => tracing::warn!(task_id = %task_id, error = %err, "reclaim failed"),
            }
        }

        for worker_id in self.workers.prune(now) {
            tracing::info!(worker_id = %worker_id, "removed stopped worker");
            self.changes.workers.insert(worker_id.clone());
            report.removed.push(worker_id);
        }
        report
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    pub fn on_disposition(
        &mut self,
        task_id: &TaskId,
        state: ReviewState,
        now: DateTime<Utc>,
    ) -> Result<bool, CoordinatorError> {
        let changed = self.admission.on_disposition(task_id, state, now)?;
        if changed {
            self.changes.review_units.insert(task_id.clone());
            self.events.push(SchedulerEvent::ReviewUpdated {
                task_id: task_id.clone(),
                state,
            });
            tracing::info!(task_id = %task_id, state = ?state, "review disposition");
        }
        Ok(changed)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            admission: self.admission.status(),
            queue: self.store.counts(),
            workers: self.workers.list(),
            review_units: self.admission.units().cloned().collect(),
            dependency_warnings: deps::dependency_warnings(&self.store),
            locks_held: self.conflicts.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Async front of the [`Coordinator`]; every call is serialized.
pub struct Scheduler {
    inner: Mutex<Coordinator>,
    journal: Option<Arc<CacheDb>>,
    events: EventBus,
}

impl Scheduler {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            inner: Mutex::new(coordinator),
            journal: None,
            events: EventBus::new(),
        }
    }

    /// Persist every committed change to `db`.
    pub fn with_journal(mut self, db: Arc<CacheDb>) -> Self {
        self.journal = Some(db);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Rebuild the coordinator from `db` and keep journaling to it.
    pub async fn restore(config: &Config, db: Arc<CacheDb>) -> Result<Self, tokio_rusqlite::Error> {
        let tasks = db.list_tasks().await?;
        let workers = db.list_workers().await?;
        let units = db.list_review_units().await?;
        tracing::info!(
            tasks = tasks.len(),
            workers = workers.len(),
            review_units = units.len(),
            "restored scheduler state"
        );
        Ok(Self::new(Coordinator::restore(config, tasks, workers, units)).with_journal(db))
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    async fn commit(&self, coordinator: &mut Coordinator) {
        let (events, changes) = coordinator.take_changes();
        if let Some(db) = &self.journal {
            if let Err(err) = persist(db, coordinator, &changes).await {
                tracing::error!(error = %err, "failed to journal scheduler state");
            }
        }
        for event in events {
            self.events.publish(event);
        }
    }

    pub async fn ingest(&self, tasks: Vec<Task>) -> Result<Vec<TaskId>, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.ingest(tasks, Utc::now());
        self.commit(&mut c).await;
        result
    }

    pub async fn ingest_descriptors(
        &self,
        descriptors: Vec<TaskDescriptor>,
    ) -> Result<Vec<TaskId>, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.ingest_descriptors(descriptors, Utc::now());
        self.commit(&mut c).await;
        result
    }

    pub async fn request_work(
        &self,
        worker_id: &WorkerId,
        specialization: Option<BTreeSet<String>>,
    ) -> WorkAssignment {
        let mut c = self.inner.lock().await;
        let assignment = c.request_work(worker_id, specialization, Utc::now());
        self.commit(&mut c).await;
        assignment
    }

    pub async fn start_work(&self, worker_id: &WorkerId, task_id: &TaskId) -> Result<Task, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.start_work(worker_id, task_id, Utc::now());
        self.commit(&mut c).await;
        result
    }

    pub async fn report_outcome(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Result<OutcomeReport, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.report_outcome(worker_id, task_id, outcome, detail, Utc::now());
        self.commit(&mut c).await;
        result
    }

    pub async fn release(&self, worker_id: &WorkerId, task_id: &TaskId) -> Result<OutcomeReport, CoordinatorError> {
        self.report_outcome(worker_id, task_id, Outcome::Released, None)
            .await
    }

    pub async fn heartbeat(&self, worker_id: &WorkerId, task_id: Option<&TaskId>) -> Worker {
        let mut c = self.inner.lock().await;
        let worker = c.heartbeat(worker_id, task_id, Utc::now());
        self.commit(&mut c).await;
        worker
    }

    pub async fn on_disposition(&self, task_id: &TaskId, state: ReviewState) -> Result<bool, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.on_disposition(task_id, state, Utc::now());
        self.commit(&mut c).await;
        result
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut c = self.inner.lock().await;
        let report = c.sweep(now);
        self.commit(&mut c).await;
        report
    }

    pub async fn archive(&self, task_id: &TaskId) -> Result<Task, CoordinatorError> {
        let mut c = self.inner.lock().await;
        let result = c.archive(task_id);
        self.commit(&mut c).await;
        result
    }

    pub async fn status(&self) -> CoordinatorStatus {
        self.inner.lock().await.status()
    }

    pub async fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.inner.lock().await.store().get(task_id).cloned()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.inner.lock().await.store().list()
    }

    /// Ids from `candidates` that the store does not know yet.
    pub async fn unknown_ids(&self, candidates: &[TaskId]) -> Vec<TaskId> {
        let c = self.inner.lock().await;
        candidates
            .iter()
            .filter(|id| !c.store().contains(id))
            .cloned()
            .collect()
    }
}

async fn persist(
    db: &CacheDb,
    coordinator: &Coordinator,
    changes: &Changes,
) -> Result<(), tokio_rusqlite::Error> {
    for id in &changes.tasks {
        match coordinator.store().get(id) {
            Some(task) => db.upsert_task(task).await?,
            None => db.delete_task(id).await?,
        }
    }
    for id in &changes.workers {
        match coordinator.workers().get(id) {
            Some(worker) => db.upsert_worker(worker).await?,
            None => db.delete_worker(id).await?,
        }
    }
    for id in &changes.review_units {
        match coordinator.admission().get(id) {
            Some(unit) => db.upsert_review_unit(unit).await?,
            None => db.delete_review_unit(id).await?,
        }
    }
    Ok(())
}
