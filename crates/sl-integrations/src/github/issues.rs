use async_trait::async_trait;
use sl_core::types::{TaskDescriptor, TaskId};

use crate::backlog::Backlog;
use crate::descriptor::{split_task_id, to_descriptor};
use crate::types::{IssueSnapshot, LabelFilter, Result};

use super::client::GitHubBacklog;

impl GitHubBacklog {
    /// Open issues (pull requests excluded) carrying every label in
    /// `require`.
    pub async fn list_open_issues(
        &self,
        repository: &str,
        require: &[String],
    ) -> Result<Vec<IssueSnapshot>> {
        let (owner, repo) = self.owner_repo(repository)?;
        let issues = self.octocrab.issues(owner, repo);
        let mut handler = issues
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100);
        if !require.is_empty() {
            handler = handler.labels(require);
        }
        let first = handler.send().await?;
        let all = self.octocrab.all_pages(first).await?;

        Ok(all
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(|issue| IssueSnapshot {
                repository: repository.to_string(),
                number: issue.number,
                title: issue.title,
                body: issue.body,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                created_at: issue.created_at,
                html_url: issue.html_url.to_string(),
            })
            .collect())
    }
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

#[async_trait]
impl Backlog for GitHubBacklog {
    async fn fetch_candidate_tasks(&self, filter: &LabelFilter) -> Result<Vec<TaskDescriptor>> {
        let mut out = Vec::new();
        for repository in &self.repositories {
            match self.list_open_issues(repository, &filter.require).await {
                Ok(issues) => {
                    let before = out.len();
                    out.extend(
                        issues
                            .iter()
                            .filter(|i| filter.matches(&i.labels))
                            .map(to_descriptor),
                    );
                    tracing::debug!(
                        repository = %repository,
                        fetched = issues.len(),
                        ready = out.len() - before,
                        "fetched backlog issues"
                    );
                }
                // One unreachable repository must not hide the others.
                Err(err) => {
                    tracing::warn!(repository = %repository, error = %err, "failed to fetch issues");
                }
            }
        }
        Ok(out)
    }

    async fn update_labels(&self, task_id: &TaskId, add: &[String], remove: &[String]) -> Result<()> {
        let (repository, number) = split_task_id(task_id)?;
        let (owner, repo) = self.owner_repo(repository)?;
        let issues = self.octocrab.issues(owner, repo);

        if !add.is_empty() {
            issues.add_labels(number, add).await?;
        }
        for label in remove {
            match issues.remove_label(number, label).await {
                Ok(_) => {}
                Err(err) if is_not_found(&err) => {
                    tracing::debug!(task_id = %task_id, label = %label, "label already absent");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn post_comment(&self, task_id: &TaskId, text: &str) -> Result<()> {
        let (repository, number) = split_task_id(task_id)?;
        let (owner, repo) = self.owner_repo(repository)?;
        self.octocrab
            .issues(owner, repo)
            .create_comment(number, text)
            .await?;
        Ok(())
    }
}
