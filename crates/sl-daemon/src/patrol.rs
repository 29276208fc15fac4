use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sl_core::scheduler::Scheduler;
use sl_core::workers::SweepReport;
use sl_telemetry::metrics::global_metrics;
use sl_telemetry::tracing_setup::create_operation_span;
use tracing::{debug, info, Instrument};

use crate::shutdown::ShutdownSignal;

/// One liveness sweep at `now`, with metrics and logging.
pub async fn run_sweep_at(scheduler: &Scheduler, now: DateTime<Utc>) -> SweepReport {
    let report = scheduler.sweep_at(now).await;

    let m = global_metrics();
    m.record_reclaims(report.reclaimed.len());
    refresh_gauges(scheduler).await;

    if report.is_empty() {
        debug!("sweep found nothing to reclaim");
    } else {
        info!(
            reclaimed = report.reclaimed.len(),
            stopped = report.stopped.len(),
            removed = report.removed.len(),
            "sweep completed"
        );
    }
    report
}

/// Push queue depth and admission state into the gauges.
pub async fn refresh_gauges(scheduler: &Scheduler) {
    let status = scheduler.status().await;
    let m = global_metrics();
    m.set_admission_blocked(status.admission.blocked);
    m.set_queue_depth("queued", status.queue.queued);
    m.set_queue_depth("assigned", status.queue.assigned);
    m.set_queue_depth("in_progress", status.queue.in_progress);
}

/// Sweep every `interval` until shutdown.
pub async fn sweep_loop(scheduler: Arc<Scheduler>, interval: Duration, shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (span, _) = create_operation_span("sweep");
                run_sweep_at(&scheduler, Utc::now()).instrument(span).await;
            }
            _ = shutdown.wait() => {
                info!("sweep loop stopping");
                break;
            }
        }
    }
}
