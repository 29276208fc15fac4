use octocrab::Octocrab;
use sl_core::config::BacklogConfig;

use crate::types::{BacklogError, Result};

/// GitHub issues across one or more repositories, addressed as
/// `owner/repo#number`.
#[derive(Debug, Clone)]
pub struct GitHubBacklog {
    pub(crate) octocrab: Octocrab,
    pub(crate) repositories: Vec<String>,
}

impl GitHubBacklog {
    pub fn new(token: String, repositories: Vec<String>) -> Result<Self> {
        let octocrab = Octocrab::builder().personal_token(token).build()?;
        Ok(Self {
            octocrab,
            repositories,
        })
    }

    /// Build from `[backlog]`, reading the token from `token_env`.
    pub fn from_config(config: &BacklogConfig) -> Result<Self> {
        let token = config
            .token()
            .ok_or_else(|| BacklogError::MissingToken(config.token_env.clone()))?;
        Self::new(token, config.repositories.clone())
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// `(owner, repo)` for a configured repository.
    pub(crate) fn owner_repo<'a>(&self, repository: &'a str) -> Result<(&'a str, &'a str)> {
        if !self.repositories.iter().any(|r| r == repository) {
            return Err(BacklogError::UnknownRepository(repository.to_string()));
        }
        repository
            .split_once('/')
            .ok_or_else(|| BacklogError::UnknownRepository(repository.to_string()))
    }
}
