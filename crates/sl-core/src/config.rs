use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.sluice/config.toml`.
///
/// **Security**: this struct never stores API keys or tokens. Only the names
/// of the environment variables holding them are configured; see
/// [`SecurityConfig::api_key`] and [`BacklogConfig::token`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub backlog: BacklogConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Config {
    /// Load config from `~/.sluice/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.admission.validate()?;
        self.scheduler.validate()?;
        self.workers.validate()?;
        self.backlog.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sluice")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `human` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.as_str() {
            "human" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be 'human' or 'json', got '{other}'"
            ))),
        }
    }
}

fn default_project_name() -> String {
    "sluice".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default = "default_daemon_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_daemon_host(),
            port: default_daemon_port(),
        }
    }
}

fn default_daemon_host() -> String {
    "127.0.0.1".into()
}
fn default_daemon_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
        }
    }
}

impl CacheConfig {
    /// Database path with a leading `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(&self.path),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_path() -> String {
    "~/.sluice/sluice.db".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_pending_review_units")]
    pub max_pending_review_units: usize,
    #[serde(default = "default_true")]
    pub block_on_changes_requested: bool,
    #[serde(default = "default_true")]
    pub allow_parallel_independent: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_pending_review_units: default_max_pending_review_units(),
            block_on_changes_requested: true,
            allow_parallel_independent: true,
        }
    }
}

impl AdmissionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_review_units == 0 {
            return Err(ConfigError::Validation(
                "admission.max_pending_review_units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_pending_review_units() -> usize {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Lock the whole repository for tasks whose file estimate is empty.
    #[serde(default)]
    pub lock_repository_when_unknown: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            lock_repository_when_unknown: false,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Validation(
                "scheduler.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Advised delay before a worker polls again after "no work".
    #[serde(default = "default_poll_backoff_secs")]
    pub poll_backoff_secs: u64,
    #[serde(default = "default_worker_retention_secs")]
    pub worker_retention_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            worker_timeout_secs: default_worker_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            poll_backoff_secs: default_poll_backoff_secs(),
            worker_retention_secs: default_worker_retention_secs(),
        }
    }
}

/// Upper bound for any duration setting: ten years.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl WorkersConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("worker_timeout_secs", self.worker_timeout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("poll_backoff_secs", self.poll_backoff_secs),
            ("worker_retention_secs", self.worker_retention_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Validation(format!(
                    "workers.{name} must be at most {MAX_DURATION_SECS}"
                )));
            }
        }
        if self.worker_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "workers.worker_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "workers.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.worker_retention_secs < self.worker_timeout_secs {
            return Err(ConfigError::Validation(
                "workers.worker_retention_secs must not be shorter than worker_timeout_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn default_worker_timeout_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_poll_backoff_secs() -> u64 {
    30
}
fn default_worker_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `owner/repo` names polled for ready issues.
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default = "default_backlog_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_ready_label")]
    pub ready_label: String,
    #[serde(default = "default_clarification_label")]
    pub clarification_label: String,
    #[serde(default = "default_in_progress_label")]
    pub in_progress_label: String,
    #[serde(default = "default_completed_label")]
    pub completed_label: String,
    #[serde(default = "default_failed_label")]
    pub failed_label: String,
    /// Environment variable holding the code-host token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repositories: Vec::new(),
            poll_interval_secs: default_backlog_poll_interval_secs(),
            ready_label: default_ready_label(),
            clarification_label: default_clarification_label(),
            in_progress_label: default_in_progress_label(),
            completed_label: default_completed_label(),
            failed_label: default_failed_label(),
            token_env: default_token_env(),
        }
    }
}

impl BacklogConfig {
    /// Read the code-host token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|v| !v.is_empty())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for repo in &self.repositories {
            let valid = repo
                .split_once('/')
                .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
            if !valid {
                return Err(ConfigError::Validation(format!(
                    "backlog.repositories entry '{repo}' must be 'owner/repo'"
                )));
            }
        }
        if self.enabled && self.repositories.is_empty() {
            return Err(ConfigError::Validation(
                "backlog.repositories must not be empty when backlog.enabled = true".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "backlog.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval_secs > MAX_DURATION_SECS {
            return Err(ConfigError::Validation(format!(
                "backlog.poll_interval_secs must be at most {MAX_DURATION_SECS}"
            )));
        }
        Ok(())
    }
}

fn default_backlog_poll_interval_secs() -> u64 {
    60
}
fn default_ready_label() -> String {
    "ai-ready".into()
}
fn default_clarification_label() -> String {
    "needs-clarification".into()
}
fn default_in_progress_label() -> String {
    "ai-in-progress".into()
}
fn default_completed_label() -> String {
    "ai-completed".into()
}
fn default_failed_label() -> String {
    "ai-failed".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Environment variable holding the HTTP API key. Unset means no auth.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
        }
    }
}

impl SecurityConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|v| !v.is_empty())
    }
}

fn default_api_key_env() -> String {
    "SLUICE_API_KEY".into()
}
