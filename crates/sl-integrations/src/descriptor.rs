//! Turning an issue into a [`TaskDescriptor`].
//!
//! Labels carry priority (`P1`, `priority:p1`, `high`), size
//! (`size:large`) and tags (`area:frontend`, `type:bug`). The body carries
//! dependencies (`Depends on #12, acme/web#7`, `Blocked by #3`) and an
//! optional `Files:` section listing paths the task will touch.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use sl_core::types::{Priority, TaskDescriptor, TaskId, TaskSize};

use crate::types::{BacklogError, IssueSnapshot, Result};

static DEPENDENCY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s>*-]*(?:depends\s+on|blocked\s+by)\s*:?\s*(.+)$").expect("valid dependency regex")
});

static ISSUE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\b([\w.-]+/[\w.-]+))?#(\d+)\b").expect("valid issue ref regex"));

static FILES_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:#+\s*files\b\s*:?|\**files\**\s*:\**)\s*(.*)$").expect("valid files header regex"));

/// `owner/repo#number`
pub fn issue_task_id(repository: &str, number: u64) -> TaskId {
    TaskId::new(format!("{repository}#{number}"))
}

/// Split `owner/repo#number` into its repository and number.
pub fn split_task_id(task_id: &TaskId) -> Result<(&str, u64)> {
    let invalid = || BacklogError::InvalidTaskId(task_id.to_string());
    let (repo, number) = task_id.as_str().rsplit_once('#').ok_or_else(invalid)?;
    let number = number.parse().map_err(|_| invalid())?;
    if !repo.contains('/') {
        return Err(invalid());
    }
    Ok((repo, number))
}

pub fn to_descriptor(issue: &IssueSnapshot) -> TaskDescriptor {
    let body = issue.body.clone().unwrap_or_default();
    let mut desc = TaskDescriptor::new(issue_task_id(&issue.repository, issue.number), &issue.title);
    desc.priority = priority_from_labels(&issue.labels);
    desc.size = size_from_labels(&issue.labels);
    desc.tags = tags_from_labels(&issue.labels);
    desc.dependencies = parse_dependencies(&body, &issue.repository);
    desc.estimated_files = parse_files(&body);
    desc.repository = Some(issue.repository.clone());
    desc.labels = issue.labels.clone();
    desc.created_at = Some(issue.created_at);
    desc.body = body;
    desc
}

/// The most urgent priority any label names; `P2` when none does.
pub fn priority_from_labels<S: AsRef<str>>(labels: &[S]) -> Priority {
    labels
        .iter()
        .filter_map(|l| {
            let l = l.as_ref().trim().to_ascii_lowercase();
            let l = l
                .strip_prefix("priority")
                .map(|rest| rest.trim_start_matches([':', '/', ' ', '-']).to_string())
                .unwrap_or(l);
            match l.as_str() {
                "p0" | "critical" => Some(Priority::P0),
                "p1" | "high" => Some(Priority::P1),
                "p2" | "medium" => Some(Priority::P2),
                "p3" | "low" => Some(Priority::P3),
                _ => None,
            }
        })
        .min()
        .unwrap_or_default()
}

pub fn size_from_labels<S: AsRef<str>>(labels: &[S]) -> TaskSize {
    labels
        .iter()
        .find_map(|l| {
            let l = l.as_ref().trim().to_ascii_lowercase();
            let value = l.strip_prefix("size:").or_else(|| l.strip_prefix("size/"))?;
            match value.trim() {
                "small" | "s" => Some(TaskSize::Small),
                "medium" | "m" => Some(TaskSize::Medium),
                "large" | "l" => Some(TaskSize::Large),
                _ => None,
            }
        })
        .unwrap_or_default()
}

/// `area:frontend` and `type:bug` become the tags `frontend` and `bug`.
pub fn tags_from_labels<S: AsRef<str>>(labels: &[S]) -> BTreeSet<String> {
    labels
        .iter()
        .filter_map(|l| {
            let l = l.as_ref().trim();
            let (prefix, value) = l.split_once(':').or_else(|| l.split_once('/'))?;
            let value = value.trim();
            match prefix.trim().to_ascii_lowercase().as_str() {
                "area" | "type" if !value.is_empty() => Some(value.to_ascii_lowercase()),
                _ => None,
            }
        })
        .collect()
}

/// Issue references on `Depends on` / `Blocked by` lines. A bare `#12`
/// refers to `repository`.
pub fn parse_dependencies(body: &str, repository: &str) -> BTreeSet<TaskId> {
    DEPENDENCY_LINE
        .captures_iter(body)
        .flat_map(|line| {
            let refs = line.get(1).map_or("", |m| m.as_str());
            ISSUE_REF
                .captures_iter(refs)
                .filter_map(|c| {
                    let number: u64 = c.get(2)?.as_str().parse().ok()?;
                    let repo = c.get(1).map_or(repository, |m| m.as_str());
                    Some(issue_task_id(repo, number))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Paths from a `Files:` section: either inline (`Files: a.rs, b.rs`) or a
/// bullet list on the following lines, ending at a blank line or heading.
pub fn parse_files(body: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        let Some(caps) = FILES_HEADER.captures(line) else {
            continue;
        };
        let inline = caps.get(1).map_or("", |m| m.as_str());
        if !inline.trim().is_empty() {
            files.extend(inline.split(',').filter_map(clean_path));
            continue;
        }
        for item in lines.by_ref() {
            let trimmed = item.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                break;
            }
            let Some(entry) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            else {
                break;
            };
            files.extend(clean_path(entry));
        }
    }

    files
}

fn clean_path(raw: &str) -> Option<String> {
    let path = raw.trim().trim_matches('`').trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    if path.is_empty() || path.contains(char::is_whitespace) {
        None
    } else {
        Some(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_round_trips_issue_ids() {
        let id = issue_task_id("acme/api", 42);
        assert_eq!(id.as_str(), "acme/api#42");
        assert_eq!(split_task_id(&id).unwrap(), ("acme/api", 42));
    }

    #[test]
    fn split_rejects_malformed_ids() {
        for bad in ["42", "acme/api", "api#42", "acme/api#x"] {
            assert!(split_task_id(&TaskId::from(bad)).is_err(), "{bad}");
        }
    }

    #[test]
    fn clean_path_strips_markup() {
        assert_eq!(clean_path(" `./src/lib.rs` ").as_deref(), Some("src/lib.rs"));
        assert_eq!(clean_path("two words"), None);
        assert_eq!(clean_path(""), None);
    }
}
