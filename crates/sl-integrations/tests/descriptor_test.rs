use chrono::{TimeZone, Utc};
use sl_core::types::{Priority, TaskId, TaskSize};
use sl_integrations::descriptor::*;
use sl_integrations::types::{IssueSnapshot, LabelFilter};

fn issue(labels: &[&str], body: &str) -> IssueSnapshot {
    IssueSnapshot {
        repository: "acme/api".to_string(),
        number: 17,
        title: "Add rate limiting".to_string(),
        body: Some(body.to_string()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        html_url: "https://github.com/acme/api/issues/17".to_string(),
    }
}

#[test]
fn priority_labels() {
    assert_eq!(priority_from_labels(&["P0"]), Priority::P0);
    assert_eq!(priority_from_labels(&["priority:p1"]), Priority::P1);
    assert_eq!(priority_from_labels(&["priority: high"]), Priority::P1);
    assert_eq!(priority_from_labels(&["critical"]), Priority::P0);
    assert_eq!(priority_from_labels(&["low"]), Priority::P3);
    assert_eq!(priority_from_labels(&["bug"]), Priority::P2);
    // most urgent wins
    assert_eq!(priority_from_labels(&["P3", "high"]), Priority::P1);
}

#[test]
fn size_labels() {
    assert_eq!(size_from_labels(&["size:large"]), TaskSize::Large);
    assert_eq!(size_from_labels(&["size/s"]), TaskSize::Small);
    assert_eq!(size_from_labels(&["big"]), TaskSize::Medium);
}

#[test]
fn area_and_type_labels_become_tags() {
    let tags = tags_from_labels(&["area:Frontend", "type:bug", "size:small", "ai-ready"]);
    assert_eq!(
        tags.into_iter().collect::<Vec<_>>(),
        vec!["bug".to_string(), "frontend".to_string()]
    );
}

#[test]
fn dependency_lines() {
    let body = "Some context.\n\nDepends on #12, acme/web#7\nBlocked by: #3\n\nNot a dep: #99";
    let deps = parse_dependencies(body, "acme/api");
    let ids: Vec<&str> = deps.iter().map(TaskId::as_str).collect();
    assert_eq!(ids, vec!["acme/api#12", "acme/api#3", "acme/web#7"]);
}

#[test]
fn dependency_lines_in_lists_and_any_case() {
    let body = "- depends on #4\n> BLOCKED BY #5";
    let deps = parse_dependencies(body, "acme/api");
    assert_eq!(deps.len(), 2);
    assert!(deps.contains(&TaskId::from("acme/api#4")));
    assert!(deps.contains(&TaskId::from("acme/api#5")));
}

#[test]
fn files_section_as_list() {
    let body = "Intro\n\n## Files\n- `src/limits.rs`\n- ./src/server/mod.rs\n* docs/limits.md\n\nOther text src/ignored.rs";
    let files = parse_files(body);
    assert_eq!(
        files.into_iter().collect::<Vec<_>>(),
        vec!["docs/limits.md", "src/limits.rs", "src/server/mod.rs"]
    );
}

#[test]
fn files_section_inline() {
    let files = parse_files("**Files:** src/a.rs, src/b.rs");
    assert!(files.contains("src/a.rs"));
    assert!(files.contains("src/b.rs"));
    assert!(parse_files("The filesystem layer is slow").is_empty());
}

#[test]
fn issue_to_descriptor() {
    let desc = to_descriptor(&issue(
        &["ai-ready", "P1", "size:small", "area:backend"],
        "Depends on #12\n\nFiles: src/limits.rs",
    ));
    assert_eq!(desc.id.as_str(), "acme/api#17");
    assert_eq!(desc.title, "Add rate limiting");
    assert_eq!(desc.priority, Priority::P1);
    assert_eq!(desc.size, TaskSize::Small);
    assert!(desc.tags.contains("backend"));
    assert!(desc.dependencies.contains(&TaskId::from("acme/api#12")));
    assert!(desc.estimated_files.contains("src/limits.rs"));
    assert_eq!(desc.repository.as_deref(), Some("acme/api"));
    assert_eq!(desc.labels.len(), 4);
    assert_eq!(
        desc.created_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    );
}

#[test]
fn label_filter_requires_ready_and_excludes_clarification() {
    let filter = LabelFilter::new("ai-ready", "needs-clarification");
    assert!(filter.matches(&["ai-ready", "P1"]));
    assert!(filter.matches(&["AI-Ready"]));
    assert!(!filter.matches(&["P1"]));
    assert!(!filter.matches(&["ai-ready", "needs-clarification"]));
}
