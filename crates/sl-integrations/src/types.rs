use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("GitHub API error: {0}")]
    GitHub(#[from] octocrab::Error),

    #[error("missing code-host token; set {0}")]
    MissingToken(String),

    #[error("task id '{0}' is not of the form owner/repo#number")]
    InvalidTaskId(String),

    #[error("repository '{0}' is not configured")]
    UnknownRepository(String),

    #[error("backlog item not found: {0}")]
    NotFound(String),

    #[error("backlog unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BacklogError>;

/// Which backlog items count as ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    /// Every one of these labels must be present.
    pub require: Vec<String>,
    /// None of these labels may be present.
    pub exclude: Vec<String>,
}

impl LabelFilter {
    pub fn new(require: impl Into<String>, exclude: impl Into<String>) -> Self {
        Self {
            require: vec![require.into()],
            exclude: vec![exclude.into()],
        }
    }

    pub fn matches<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        let has = |want: &str| labels.iter().any(|l| l.as_ref().eq_ignore_ascii_case(want));
        self.require.iter().all(|r| has(r)) && !self.exclude.iter().any(|e| has(e))
    }
}

/// An open issue as fetched from a code host, before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSnapshot {
    /// `owner/repo`
    pub repository: String,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub html_url: String,
}
