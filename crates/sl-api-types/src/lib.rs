//! Request and response bodies for the sluice HTTP API.
//!
//! Shared by the bridge (server) and the CLI (client) so both sides agree
//! on field names and defaults.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sl_core::scheduler::{CoordinatorStatus, OutcomeReport, WorkAssignment};
use sl_core::types::{
    DependencyWarning, Outcome, QueueCounts, ReviewState, ReviewUnit, Task, TaskDescriptor,
    TaskId, Worker, WorkerId,
};

// ── Work protocol ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub worker_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResponse {
    pub work_available: bool,
    #[serde(default)]
    pub task: Option<Task>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// How long the worker should wait before asking again when no task
    /// was handed out.
    pub poll_backoff_secs: u64,
}

impl WorkResponse {
    pub fn from_assignment(assignment: WorkAssignment, poll_backoff_secs: u64) -> Self {
        Self {
            work_available: assignment.task.is_some(),
            task: assignment.task,
            blocked: assignment.blocked,
            reason: assignment.reason,
            poll_backoff_secs,
        }
    }
}

/// Body for `/work/start` and `/work/release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskClaim {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    pub outcome: Outcome,
    /// Review URL on completion, error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub task: Task,
    pub changed: bool,
}

impl From<OutcomeReport> for ReportResponse {
    fn from(report: OutcomeReport) -> Self {
        Self {
            task: report.task,
            changed: report.changed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

// ── Status ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub pending_count: usize,
    pub changes_requested_count: usize,
    pub approved_count: usize,
    pub blocked: bool,
    pub blocking_reason: Option<String>,
    pub queue: QueueCounts,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub review_units: Vec<ReviewUnit>,
    #[serde(default)]
    pub dependency_warnings: Vec<DependencyWarning>,
    #[serde(default)]
    pub locks_held: usize,
}

impl From<CoordinatorStatus> for StatusResponse {
    fn from(status: CoordinatorStatus) -> Self {
        Self {
            pending_count: status.admission.pending_count,
            changes_requested_count: status.admission.changes_requested_count,
            approved_count: status.admission.approved_count,
            blocked: status.admission.blocked,
            blocking_reason: status.admission.blocking_reason,
            queue: status.queue,
            workers: status.workers,
            review_units: status.review_units,
            dependency_warnings: status.dependency_warnings,
            locks_held: status.locks_held,
        }
    }
}

// ── Review collaborator ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionRequest {
    pub task_id: TaskId,
    pub state: ReviewState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionResponse {
    pub changed: bool,
}

// ── Backlog ingest ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub tasks: Vec<TaskDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sl_core::types::AdmissionStatus;

    #[test]
    fn work_request_specialization_is_optional() {
        let req: WorkRequest = serde_json::from_str(r#"{"worker_id":"w1"}"#).unwrap();
        assert_eq!(req.worker_id, WorkerId::from("w1"));
        assert!(req.specialization.is_none());

        let req: WorkRequest =
            serde_json::from_str(r#"{"worker_id":"w1","specialization":["docs"]}"#).unwrap();
        assert!(req.specialization.unwrap().contains("docs"));
    }

    #[test]
    fn empty_assignment_reports_no_work() {
        let assignment = WorkAssignment {
            task: None,
            blocked: true,
            reason: Some("Too many pending review units: 5.".into()),
            conflicts_skipped: 0,
        };
        let resp = WorkResponse::from_assignment(assignment, 30);
        assert!(!resp.work_available);
        assert!(resp.blocked);
        assert_eq!(resp.poll_backoff_secs, 30);
    }

    #[test]
    fn report_outcome_uses_snake_case() {
        let req: ReportRequest = serde_json::from_str(
            r#"{"worker_id":"w1","task_id":"acme/api#4","outcome":"failed","detail":"tests red"}"#,
        )
        .unwrap();
        assert_eq!(req.outcome, Outcome::Failed);
        assert_eq!(req.detail.as_deref(), Some("tests red"));
    }

    #[test]
    fn status_flattens_admission() {
        let status = CoordinatorStatus {
            admission: AdmissionStatus {
                pending_count: 2,
                changes_requested_count: 1,
                approved_count: 0,
                blocked: true,
                blocking_reason: Some("x".into()),
            },
            queue: QueueCounts::default(),
            workers: vec![Worker::new("w1", Utc::now())],
            review_units: vec![],
            dependency_warnings: vec![],
            locks_held: 3,
        };
        let json = serde_json::to_value(StatusResponse::from(status)).unwrap();
        assert_eq!(json["pending_count"], 2);
        assert_eq!(json["blocked"], true);
        assert_eq!(json["queue"]["queued"], 0);
        assert_eq!(json["workers"][0]["id"], "w1");
        assert_eq!(json["locks_held"], 3);
    }

    #[test]
    fn disposition_state_names() {
        let req: DispositionRequest =
            serde_json::from_str(r#"{"task_id":"a","state":"changes_requested"}"#).unwrap();
        assert_eq!(req.state, ReviewState::ChangesRequested);
    }
}
