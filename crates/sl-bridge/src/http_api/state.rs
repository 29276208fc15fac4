use std::sync::Arc;
use std::time::Instant;

use sl_core::scheduler::Scheduler;

/// Shared state behind every handler.
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
    /// Advised wait between polls when no work is handed out.
    pub poll_backoff_secs: u64,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(scheduler: Arc<Scheduler>, poll_backoff_secs: u64) -> Self {
        Self {
            scheduler,
            poll_backoff_secs,
            started_at: Instant::now(),
        }
    }
}
