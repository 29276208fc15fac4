use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sl_core::config::BacklogConfig;
use sl_core::error::CoordinatorError;
use sl_core::scheduler::Scheduler;
use sl_core::types::{TaskDescriptor, TaskId};
use sl_integrations::backlog::Backlog;
use sl_integrations::types::{BacklogError, LabelFilter};
use sl_telemetry::metrics::global_metrics;
use sl_telemetry::tracing_setup::create_operation_span;
use tracing::{debug, info, warn, Instrument};

use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntakeReport {
    /// Candidates the backlog returned.
    pub fetched: usize,
    /// Candidates the store did not know yet.
    pub new: usize,
    pub ingested: Vec<TaskId>,
    pub rejected: Vec<(TaskId, String)>,
}

/// Pulls ready items from a backlog into the scheduler.
pub struct IntakeRunner {
    backlog: Arc<dyn Backlog>,
    filter: LabelFilter,
}

impl IntakeRunner {
    pub fn new(backlog: Arc<dyn Backlog>, filter: LabelFilter) -> Self {
        Self { backlog, filter }
    }

    /// Ready label required, clarification label excluded.
    pub fn from_config(backlog: Arc<dyn Backlog>, config: &BacklogConfig) -> Self {
        Self::new(
            backlog,
            LabelFilter::new(&config.ready_label, &config.clarification_label),
        )
    }

    /// Fetch once and ingest what is new.
    ///
    /// A rejected batch is narrowed and retried: every member of a dependency
    /// cycle is dropped together, so no half of a cycle is ever stored, and a
    /// duplicate id drops only the offending copy.
    pub async fn run_once(&self, scheduler: &Scheduler) -> Result<IntakeReport, BacklogError> {
        let candidates = self.backlog.fetch_candidate_tasks(&self.filter).await?;
        let mut report = IntakeReport {
            fetched: candidates.len(),
            ..IntakeReport::default()
        };

        let ids: Vec<TaskId> = candidates.iter().map(|d| d.id.clone()).collect();
        let unknown = scheduler.unknown_ids(&ids).await;
        let fresh: Vec<TaskDescriptor> = candidates
            .into_iter()
            .filter(|d| unknown.contains(&d.id))
            .collect();
        report.new = fresh.len();
        if fresh.is_empty() {
            debug!(fetched = report.fetched, "no new backlog items");
            return Ok(report);
        }

        let mut batch = fresh;
        while !batch.is_empty() {
            let err = match scheduler.ingest_descriptors(batch.clone()).await {
                Ok(ids) => {
                    report.ingested = ids;
                    break;
                }
                Err(err) => err,
            };
            let rejected: Vec<TaskId> = match &err {
                CoordinatorError::DependencyCycle { cycle } => cycle.clone(),
                CoordinatorError::DuplicateTask(id) => vec![id.clone()],
                _ => batch.iter().map(|d| d.id.clone()).collect(),
            };
            let before = batch.len();
            match &err {
                // Only the later copy goes; the first may still be new.
                CoordinatorError::DuplicateTask(id) => {
                    if let Some(pos) = batch.iter().rposition(|d| &d.id == id) {
                        batch.remove(pos);
                    }
                }
                _ => batch.retain(|d| !rejected.contains(&d.id)),
            }
            if batch.len() == before {
                // The offending ids are not in this batch; nothing left to narrow.
                warn!(error = %err, batch = before, "backlog batch rejected");
                report
                    .rejected
                    .extend(batch.drain(..).map(|d| (d.id, err.to_string())));
                break;
            }
            warn!(error = %err, remaining = batch.len(), "backlog items rejected, retrying the rest");
            let mut seen = Vec::new();
            for id in rejected {
                if !seen.contains(&id) && unknown.contains(&id) {
                    report.rejected.push((id.clone(), err.to_string()));
                    seen.push(id);
                }
            }
        }

        global_metrics().record_ingested(report.ingested.len());
        info!(
            fetched = report.fetched,
            ingested = report.ingested.len(),
            rejected = report.rejected.len(),
            "backlog intake"
        );
        Ok(report)
    }
}

/// Poll every `interval` until shutdown. The first poll runs immediately.
pub async fn intake_loop(
    scheduler: Arc<Scheduler>,
    runner: IntakeRunner,
    interval: Duration,
    shutdown: ShutdownSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (span, _) = create_operation_span("intake");
                if let Err(err) = runner.run_once(&scheduler).instrument(span).await {
                    warn!(error = %err, "backlog intake failed");
                }
            }
            _ = shutdown.wait() => {
                info!("intake loop stopping");
                break;
            }
        }
    }
}
