//! Dependency gating: eligibility, cycle detection and warnings.

use std::collections::{HashSet, VecDeque};

use crate::store::TaskStore;
use crate::types::{DependencyWarning, Task, TaskId, TaskStatus, WarningKind};

/// Why a task can or cannot run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Some dependencies exist but are not completed yet.
    Waiting(Vec<TaskId>),
    /// Some dependency ids are not known to the store.
    UnknownDependency(Vec<TaskId>),
    /// Some dependencies reached terminal failure.
    DependencyFailed(Vec<TaskId>),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Evaluate every dependency of `task` against the store.
///
/// Unknown ids take precedence over failed ones, which take precedence over
/// dependencies that are still in flight.
pub fn eligibility(task: &Task, store: &TaskStore) -> Eligibility {
    let mut unknown = Vec::new();
    let mut failed = Vec::new();
    let mut waiting = Vec::new();
    for dep in &task.dependencies {
        match store.get(dep).map(|t| t.status) {
            None => unknown.push(dep.clone()),
            Some(TaskStatus::Completed) => {}
            Some(TaskStatus::Failed) => failed.push(dep.clone()),
            Some(_) => waiting.push(dep.clone()),
        }
    }
    if !unknown.is_empty() {
        Eligibility::UnknownDependency(unknown)
    } else if !failed.is_empty() {
        Eligibility::DependencyFailed(failed)
    } else if !waiting.is_empty() {
        Eligibility::Waiting(waiting)
    } else {
        Eligibility::Eligible
    }
}

pub fn is_eligible(task: &Task, store: &TaskStore) -> bool {
    eligibility(task, store).is_eligible()
}

/// Dependencies of queued tasks that can never be satisfied as things stand.
pub fn dependency_warnings(store: &TaskStore) -> Vec<DependencyWarning> {
    let mut warnings = Vec::new();
    for task in store.list_queued() {
        for dep in &task.dependencies {
            let kind = match store.get(dep).map(|t| t.status) {
                None => WarningKind::Unknown,
                Some(TaskStatus::Failed) => WarningKind::Failed,
                Some(_) => continue,
            };
            warnings.push(DependencyWarning {
                task_id: task.id.clone(),
                dependency: dep.clone(),
                kind,
            });
        }
    }
    warnings
}

/// Depth-first search for a cycle reachable from any of `roots`.
///
/// `deps_of` returns the dependency ids of a node; unknown nodes return an
/// empty list. On success the returned path starts and ends at the same id.
pub fn find_cycle<'a, I>(roots: I, deps_of: &dyn Fn(&TaskId) -> Vec<TaskId>) -> Option<Vec<TaskId>>
where
    I: IntoIterator<Item = &'a TaskId>,
{
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut path = Vec::new();
    for root in roots {
        if let Some(cycle) = visit(root, deps_of, &mut visiting, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    node: &TaskId,
    deps_of: &dyn Fn(&TaskId) -> Vec<TaskId>,
    visiting: &mut HashSet<TaskId>,
    visited: &mut HashSet<TaskId>,
    path: &mut Vec<TaskId>,
) -> Option<Vec<TaskId>> {
    if visited.contains(node) {
        return None;
    }
    if visiting.contains(node) {
        let start = path.iter().position(|id| id == node).unwrap_or(0);
        let mut cycle = path[start..].to_vec();
        cycle.push(node.clone());
        return Some(cycle);
    }

    visiting.insert(node.clone());
    path.push(node.clone());
    for dep in deps_of(node) {
        if let Some(cycle) = visit(&dep, deps_of, visiting, visited, path) {
            return Some(cycle);
        }
    }
    path.pop();
    visiting.remove(node);
    visited.insert(node.clone());
    None
}

/// True when either task is reachable from the other along dependency edges.
pub fn related(a: &TaskId, b: &TaskId, store: &TaskStore) -> bool {
    a == b || reaches(a, b, store) || reaches(b, a, store)
}

fn reaches(from: &TaskId, target: &TaskId, store: &TaskStore) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([from.clone()]);
    while let Some(id) = queue.pop_front() {
        let Some(task) = store.get(&id) else {
            continue;
        };
        for dep in &task.dependencies {
            if dep == target {
                return true;
            }
            if seen.insert(dep.clone()) {
                queue.push_back(dep.clone());
            }
        }
    }
    false
}
