use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, Worker, WorkerId, WorkerStatus};

/// What one liveness sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Tasks returned to the queue, with the worker that held them.
    pub reclaimed: Vec<(WorkerId, TaskId)>,
    /// Workers marked stopped for missing heartbeats.
    pub stopped: Vec<WorkerId>,
    /// Stopped workers dropped from the registry after the retention period.
    pub removed: Vec<WorkerId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty() && self.stopped.is_empty() && self.removed.is_empty()
    }
}

/// Liveness record of every worker that has contacted the coordinator.
#[derive(Debug, Clone)]
pub struct WorkerRegistry {
    workers: BTreeMap<WorkerId, Worker>,
    timeout: Duration,
    retention: Duration,
}

impl WorkerRegistry {
    pub fn new(timeout: Duration, retention: Duration) -> Self {
        Self {
            workers: BTreeMap::new(),
            timeout,
            retention,
        }
    }

    pub fn restore(&mut self, workers: impl IntoIterator<Item = Worker>) {
        for worker in workers {
            self.workers.insert(worker.id.clone(), worker);
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record contact from `id`, registering it if unknown and reviving it if
    /// stopped. A `Some` specialization replaces the stored one.
    pub fn touch(
        &mut self,
        id: &WorkerId,
        specialization: Option<BTreeSet<String>>,
        now: DateTime<Utc>,
    ) -> &mut Worker {
        let worker = self
            .workers
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::info!(worker_id = %id, "registered worker");
                Worker::new(id.clone(), now)
            });
        worker.last_heartbeat = now;
        if worker.status == WorkerStatus::Stopped {
            tracing::info!(worker_id = %id, "worker resumed after timeout");
            worker.status = WorkerStatus::Idle;
            worker.current_task = None;
        }
        if specialization.is_some() {
            worker.specialization = specialization;
        }
        worker
    }

    pub fn get(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(id)
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    pub fn list(&self) -> Vec<Worker> {
        self.workers.values().cloned().collect()
    }

    pub fn set_status(&mut self, id: &WorkerId, status: WorkerStatus, current_task: Option<TaskId>) {
        if let Some(worker) = self.workers.get_mut(id) {
            worker.status = status;
            worker.current_task = current_task;
        }
    }

    /// Workers, not already stopped, whose last heartbeat is older than the timeout.
    pub fn timed_out(&self, now: DateTime<Utc>) -> Vec<WorkerId> {
        self.workers
            .values()
            .filter(|w| w.status != WorkerStatus::Stopped && now - w.last_heartbeat > self.timeout)
            .map(|w| w.id.clone())
            .collect()
    }

    pub fn mark_stopped(&mut self, id: &WorkerId) {
        self.set_status(id, WorkerStatus::Stopped, None);
    }

    /// Drop stopped workers that have been silent longer than the retention period.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Vec<WorkerId> {
        let expired: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Stopped && now - w.last_heartbeat > self.retention)
            .map(|w| w.id.clone())
            .collect();
        for id in &expired {
            self.workers.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new(Duration::seconds(300), Duration::days(7))
    }

    #[test]
    fn touch_registers_and_revives() {
        let mut reg = registry();
        let now = Utc::now();
        let id = WorkerId::from("w1");
        reg.touch(&id, None, now);
        assert_eq!(reg.get(&id).map(|w| w.status), Some(WorkerStatus::Idle));

        reg.mark_stopped(&id);
        reg.touch(&id, None, now + Duration::seconds(10));
        assert_eq!(reg.get(&id).map(|w| w.status), Some(WorkerStatus::Idle));
    }

    #[test]
    fn timed_out_skips_stopped_and_fresh_workers() {
        let mut reg = registry();
        let t0 = Utc::now();
        reg.touch(&WorkerId::from("old"), None, t0);
        reg.touch(&WorkerId::from("fresh"), None, t0 + Duration::seconds(290));
        reg.touch(&WorkerId::from("gone"), None, t0);
        reg.mark_stopped(&WorkerId::from("gone"));

        let stale = reg.timed_out(t0 + Duration::seconds(301));
        assert_eq!(stale, vec![WorkerId::from("old")]);
    }

    #[test]
    fn prune_removes_long_stopped_workers() {
        let mut reg = registry();
        let t0 = Utc::now();
        let id = WorkerId::from("w1");
        reg.touch(&id, None, t0);
        reg.mark_stopped(&id);

        assert!(reg.prune(t0 + Duration::days(6)).is_empty());
        assert_eq!(reg.prune(t0 + Duration::days(8)), vec![id.clone()]);
        assert!(!reg.contains(&id));
    }
}
