use std::sync::Arc;

use sl_core::events::SchedulerEvent;
use sl_integrations::backlog::Backlog;
use sl_integrations::projection::{apply, plan, LabelScheme};
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

/// Project one event; returns the number of failed backlog writes.
pub async fn project_event(backlog: &dyn Backlog, scheme: &LabelScheme, event: &SchedulerEvent) -> usize {
    let actions = plan(event, scheme);
    if actions.is_empty() {
        return 0;
    }
    debug!(actions = actions.len(), ?event, "projecting event");
    apply(backlog, &actions).await
}

/// Mirror events from `events` onto `backlog` until shutdown or until the
/// bus goes away.
pub async fn projection_loop(
    events: flume::Receiver<SchedulerEvent>,
    backlog: Arc<dyn Backlog>,
    scheme: LabelScheme,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            received = events.recv_async() => {
                match received {
                    Ok(event) => {
                        project_event(backlog.as_ref(), &scheme, &event).await;
                    }
                    Err(_) => {
                        info!("event bus closed, projection loop stopping");
                        break;
                    }
                }
            }
            _ = shutdown.wait() => {
                info!("projection loop stopping");
                break;
            }
        }
    }
}
