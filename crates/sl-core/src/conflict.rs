//! File-level conflict prevention.
//!
//! Every active task holds locks on the path patterns it is expected to
//! touch. Two patterns overlap when they are identical or one is a path
//! prefix of the other, compared component by component. Over-locking is
//! acceptable; missing an overlap is not.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::types::{Task, TaskId};

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Strategy that guesses which files a task will touch. Must be pure.
pub trait FileEstimator: Send + Sync {
    fn estimate(&self, task: &Task) -> BTreeSet<String>;
}

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://\S+").expect("valid url regex"));

static PATH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_.\-/*]+").expect("valid path token regex"));

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-.*]*[A-Za-z0-9_\-*]\.[A-Za-z][A-Za-z0-9]{0,7}$")
        .expect("valid file name regex")
});

/// Default estimator: picks path-looking tokens out of the title and body.
///
/// A token counts as a path when it contains a `/` or ends in something that
/// looks like a file extension. URLs and `owner/repo#N` references are
/// skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathMentionEstimator;

impl PathMentionEstimator {
    fn scan(text: &str, out: &mut BTreeSet<String>) {
        let text = URL.replace_all(text, " ");
        for m in PATH_TOKEN.find_iter(&text) {
            if text[m.end()..].starts_with('#') {
                continue;
            }
            let token = m.as_str().trim_end_matches('.');
            if token.is_empty() || token.chars().all(|c| c == '.' || c == '/' || c == '*') {
                continue;
            }
            let last = token.rsplit('/').next().unwrap_or(token);
            let nested = token.trim_matches('/').contains('/');
            if nested || FILE_NAME.is_match(last) {
                let normalized = normalize_pattern(token);
                if !normalized.is_empty() {
                    out.insert(normalized);
                }
            }
        }
    }
}

impl FileEstimator for PathMentionEstimator {
    fn estimate(&self, task: &Task) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        Self::scan(&task.title, &mut out);
        Self::scan(&task.body, &mut out);
        out
    }
}

/// Strip `./`, leading, trailing and repeated `/` from a pattern.
pub fn normalize_pattern(pattern: &str) -> String {
    let mut rest = pattern.trim();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Overlap
// ---------------------------------------------------------------------------

fn is_glob(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Components before the first one that contains a glob metacharacter.
fn literal_components(pattern: &str) -> Vec<&str> {
    pattern
        .split('/')
        .filter(|c| !c.is_empty())
        .take_while(|c| !is_glob(c))
        .collect()
}

/// True if the two (normalized) patterns may name a common file.
///
/// The empty pattern covers the whole repository.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let ca = literal_components(a);
    let cb = literal_components(b);
    let n = ca.len().min(cb.len());
    ca[..n] == cb[..n]
}

// ---------------------------------------------------------------------------
// Lock table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub repository: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    Conflict { holding_tasks: Vec<TaskId> },
}

/// Owns the file lock table. Nothing outside this type reads or writes it.
pub struct ConflictResolver {
    estimator: Arc<dyn FileEstimator>,
    lock_repository_when_unknown: bool,
    locks: BTreeMap<LockKey, TaskId>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("lock_repository_when_unknown", &self.lock_repository_when_unknown)
            .field("locks", &self.locks)
            .finish()
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(Arc::new(PathMentionEstimator), false)
    }
}

impl ConflictResolver {
    pub fn new(estimator: Arc<dyn FileEstimator>, lock_repository_when_unknown: bool) -> Self {
        Self {
            estimator,
            lock_repository_when_unknown,
            locks: BTreeMap::new(),
        }
    }

    /// Explicit patterns on the task plus whatever the estimator finds, normalized.
    pub fn estimate_files(&self, task: &Task) -> BTreeSet<String> {
        task.estimated_files
            .iter()
            .map(|p| normalize_pattern(p))
            .filter(|p| !p.is_empty())
            .chain(self.estimator.estimate(task))
            .collect()
    }

    fn lock_set(&self, task: &Task) -> Vec<LockKey> {
        let repository = task.repository.clone().unwrap_or_default();
        if task.estimated_files.is_empty() && self.lock_repository_when_unknown {
            return vec![LockKey {
                repository,
                pattern: String::new(),
            }];
        }
        task.estimated_files
            .iter()
            .map(|pattern| LockKey {
                repository: repository.clone(),
                pattern: pattern.clone(),
            })
            .collect()
    }

    /// True if `a` and `b` would contend for a lock in one repository.
    ///
    /// Uses the same lock sets as [`ConflictResolver::try_lock`], so a task
    /// with no estimate covers its whole repository when that option is on.
    pub fn overlaps(&self, a: &Task, b: &Task) -> bool {
        let theirs = self.lock_set(b);
        self.lock_set(a).iter().any(|wa| {
            theirs.iter().any(|wb| {
                wa.repository == wb.repository && patterns_overlap(&wa.pattern, &wb.pattern)
            })
        })
    }

    /// Tasks (other than `task`) holding a lock that overlaps `task`'s files.
    pub fn conflicts(&self, task: &Task) -> Vec<TaskId> {
        let wanted = self.lock_set(task);
        let mut holders = BTreeSet::new();
        for (key, holder) in &self.locks {
            if holder == &task.id {
                continue;
            }
            let hit = wanted.iter().any(|w| {
                w.repository == key.repository && patterns_overlap(&w.pattern, &key.pattern)
            });
            if hit {
                holders.insert(holder.clone());
            }
        }
        holders.into_iter().collect()
    }

    /// Lock all of `task`'s patterns, or none of them.
    pub fn try_lock(&mut self, task: &Task) -> LockOutcome {
        let holding_tasks = self.conflicts(task);
        if !holding_tasks.is_empty() {
            return LockOutcome::Conflict { holding_tasks };
        }
        for key in self.lock_set(task) {
            self.locks.insert(key, task.id.clone());
        }
        LockOutcome::Acquired
    }

    /// Drop every lock held by `task`. Returns how many were removed.
    pub fn release(&mut self, task: &TaskId) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, holder| holder != task);
        before - self.locks.len()
    }

    pub fn held_by(&self, task: &TaskId) -> Vec<LockKey> {
        self.locks
            .iter()
            .filter(|(_, holder)| *holder == task)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
