//! Review-backlog backpressure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::AdmissionConfig;
use crate::conflict::ConflictResolver;
use crate::deps;
use crate::error::CoordinatorError;
use crate::store::TaskStore;
use crate::types::{AdmissionStatus, ReviewState, ReviewUnit, Task, TaskId};

/// Tracks outstanding review units and derives the block signal from them.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    config: AdmissionConfig,
    units: BTreeMap<TaskId, ReviewUnit>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            units: BTreeMap::new(),
        }
    }

    pub fn restore(config: AdmissionConfig, units: impl IntoIterator<Item = ReviewUnit>) -> Self {
        Self {
            config,
            units: units.into_iter().map(|u| (u.task_id.clone(), u)).collect(),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Start tracking a review unit for `task_id` in `pending`.
    ///
    /// Registering a task that already has a unit resets it to `pending`.
    pub fn register(&mut self, task_id: TaskId, url: Option<String>, now: DateTime<Utc>) {
        let unit = self.units.entry(task_id.clone()).or_insert(ReviewUnit {
            task_id,
            state: ReviewState::Pending,
            url: None,
            created_at: now,
            updated_at: now,
        });
        unit.state = ReviewState::Pending;
        unit.updated_at = now;
        if url.is_some() {
            unit.url = url;
        }
    }

    /// Apply a review disposition. `merged` and `closed` stop tracking the
    /// unit; repeating them (or sending them for an unknown unit) is a no-op.
    ///
    /// Returns `true` when tracked state changed.
    pub fn on_disposition(
        &mut self,
        task_id: &TaskId,
        state: ReviewState,
        now: DateTime<Utc>,
    ) -> Result<bool, CoordinatorError> {
        if state.is_final() {
            return Ok(self.units.remove(task_id).is_some());
        }
        let unit = self
            .units
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::UnknownReviewUnit(task_id.clone()))?;
        if unit.state == state {
            return Ok(false);
        }
        unit.state = state;
        unit.updated_at = now;
        Ok(true)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&ReviewUnit> {
        self.units.get(task_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &ReviewUnit> {
        self.units.values()
    }

    /// Global admission state, derived from the tracked units.
    pub fn status(&self) -> AdmissionStatus {
        let pending: Vec<&TaskId> = self.ids_in(ReviewState::Pending);
        let changes_requested: Vec<&TaskId> = self.ids_in(ReviewState::ChangesRequested);
        let approved_count = self.ids_in(ReviewState::Approved).len();

        let max = self.config.max_pending_review_units;
        let mut reasons = Vec::new();
        if self.config.block_on_changes_requested && !changes_requested.is_empty() {
            reasons.push(format!(
                "Changes requested on review units: {}. Address feedback before proceeding.",
                join_ids(&changes_requested)
            ));
        }
        if pending.len() >= max {
            reasons.push(format!(
                "Too many pending review units: {}. Review and merge before proceeding (max: {}).",
                pending.len(),
                max
            ));
        }

        AdmissionStatus {
            pending_count: pending.len(),
            changes_requested_count: changes_requested.len(),
            approved_count,
            blocked: !reasons.is_empty(),
            blocking_reason: (!reasons.is_empty()).then(|| reasons.join(" ")),
        }
    }

    /// Admission state as it applies to one candidate task.
    ///
    /// With `allow_parallel_independent` on, a globally blocked controller
    /// still admits a task that shares no files and no dependency chain with
    /// any unit awaiting review. Units whose task is no longer in the store
    /// are treated as related. File overlap is judged by `conflicts`, the
    /// same lock sets work assignment would take.
    pub fn status_for(
        &self,
        task: &Task,
        store: &TaskStore,
        conflicts: &ConflictResolver,
    ) -> AdmissionStatus {
        let mut status = self.status();
        if !status.blocked || !self.config.allow_parallel_independent {
            return status;
        }
        let independent = self
            .units
            .values()
            .filter(|u| u.state != ReviewState::Approved)
            .all(|unit| match store.get(&unit.task_id) {
                Some(reviewed) => {
                    !conflicts.overlaps(task, reviewed)
                        && !deps::related(&task.id, &unit.task_id, store)
                }
                None => false,
            });
        if independent {
            status.blocked = false;
            status.blocking_reason = None;
        }
        status
    }

    fn ids_in(&self, state: ReviewState) -> Vec<&TaskId> {
        self.units
            .values()
            .filter(|u| u.state == state)
            .map(|u| &u.task_id)
            .collect()
    }
}

fn join_ids(ids: &[&TaskId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}
