use sl_core::types::*;

#[test]
fn task_status_valid_transitions() {
    assert!(TaskStatus::Queued.can_transition_to(&TaskStatus::Assigned));
    assert!(TaskStatus::Assigned.can_transition_to(&TaskStatus::InProgress));
    assert!(TaskStatus::Assigned.can_transition_to(&TaskStatus::Queued));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Queued));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Completed));
    assert!(TaskStatus::InProgress.can_transition_to(&TaskStatus::Failed));
}

#[test]
fn task_status_invalid_transitions() {
    assert!(!TaskStatus::Queued.can_transition_to(&TaskStatus::InProgress));
    assert!(!TaskStatus::Queued.can_transition_to(&TaskStatus::Completed));
    assert!(!TaskStatus::Assigned.can_transition_to(&TaskStatus::Completed));
    assert!(!TaskStatus::Completed.can_transition_to(&TaskStatus::Queued));
    assert!(!TaskStatus::Failed.can_transition_to(&TaskStatus::Queued));
}

#[test]
fn priority_orders_p0_first() {
    let mut ps = vec![Priority::P3, Priority::P0, Priority::P2, Priority::P1];
    ps.sort();
    assert_eq!(ps, vec![Priority::P0, Priority::P1, Priority::P2, Priority::P3]);
}

#[test]
fn wire_names() {
    assert_eq!(serde_json::to_string(&Priority::P1).unwrap(), "\"P1\"");
    assert_eq!(
        serde_json::to_string(&TaskStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
    assert_eq!(
        serde_json::to_string(&ReviewState::ChangesRequested).unwrap(),
        "\"changes_requested\""
    );
    assert_eq!(serde_json::to_string(&TaskId::from("o/r#1")).unwrap(), "\"o/r#1\"");
}

#[test]
fn descriptor_defaults_when_fields_missing() {
    let desc: TaskDescriptor =
        serde_json::from_str(r#"{"id": "o/r#3", "title": "Fix it"}"#).unwrap();
    assert_eq!(desc.priority, Priority::P2);
    assert_eq!(desc.size, TaskSize::Medium);
    assert!(desc.dependencies.is_empty());

    let now = chrono::Utc::now();
    let task = Task::from_descriptor(desc, now);
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.created_at, now);
}
