use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::types::{ReviewState, TaskId, WorkerId};

/// State changes committed by the scheduler, published after commit.
///
/// Subscribers observe; they never feed changes back into the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    TaskIngested {
        task_id: TaskId,
    },
    TaskAssigned {
        task_id: TaskId,
        worker_id: WorkerId,
    },
    TaskStarted {
        task_id: TaskId,
        worker_id: WorkerId,
    },
    TaskCompleted {
        task_id: TaskId,
        worker_id: WorkerId,
        url: Option<String>,
    },
    /// Failed, with retries left; back in the queue.
    TaskRequeued {
        task_id: TaskId,
        worker_id: WorkerId,
        retry_count: u32,
        error: Option<String>,
    },
    /// Failed for the last time.
    TaskFailed {
        task_id: TaskId,
        worker_id: WorkerId,
        retry_count: u32,
        error: Option<String>,
    },
    /// Released by the worker, or reclaimed after a liveness timeout.
    TaskReleased {
        task_id: TaskId,
        worker_id: WorkerId,
        reclaimed: bool,
    },
    TaskArchived {
        task_id: TaskId,
    },
    ReviewUpdated {
        task_id: TaskId,
        state: ReviewState,
    },
    WorkerStopped {
        worker_id: WorkerId,
    },
}

/// A broadcast-style event bus built on top of flume channels.
///
/// Each call to [`EventBus::subscribe`] creates a receiver that gets every
/// event published after the subscription. Cloning is cheap.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<SchedulerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> flume::Receiver<SchedulerEvent> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut senders) = self.inner.lock() {
            senders.push(tx);
        }
        rx
    }

    /// Send `event` to all current subscribers, pruning disconnected ones.
    pub fn publish(&self, event: SchedulerEvent) {
        if let Ok(mut senders) = self.inner.lock() {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.publish(SchedulerEvent::TaskIngested {
            task_id: TaskId::from("a"),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(SchedulerEvent::TaskIngested { .. })
        ));
    }
}
