use std::io::Write;

use sl_core::config::{Config, ConfigError, MAX_DURATION_SECS};
use sl_core::scheduler::Coordinator;
use sl_core::types::{Task, WorkerId};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.project_name, "sluice");
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "human");
    assert_eq!(cfg.daemon.host, "127.0.0.1");
    assert_eq!(cfg.daemon.port, 8000);
    assert_eq!(cfg.admission.max_pending_review_units, 5);
    assert!(cfg.admission.block_on_changes_requested);
    assert!(cfg.admission.allow_parallel_independent);
    assert_eq!(cfg.scheduler.max_retries, 2);
    assert!(!cfg.scheduler.lock_repository_when_unknown);
    assert_eq!(cfg.workers.worker_timeout_secs, 300);
    assert_eq!(cfg.workers.worker_retention_secs, 604_800);
    assert_eq!(cfg.backlog.ready_label, "ai-ready");
    assert_eq!(cfg.backlog.clarification_label, "needs-clarification");
    assert_eq!(cfg.backlog.poll_interval_secs, 60);
    assert_eq!(cfg.security.api_key_env, "SLUICE_API_KEY");
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("sluice"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.general.project_name, cfg.general.project_name);
    assert_eq!(parsed.daemon.port, cfg.daemon.port);
    assert_eq!(parsed.admission, cfg.admission);
    assert_eq!(parsed.workers.poll_backoff_secs, cfg.workers.poll_backoff_secs);
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[admission]
max_pending_review_units = 2

[backlog]
enabled = true
repositories = ["acme/api", "acme/web"]
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.admission.max_pending_review_units, 2);
    assert!(cfg.admission.block_on_changes_requested);
    assert_eq!(cfg.backlog.repositories.len(), 2);
    assert_eq!(cfg.scheduler.max_retries, 2);
    cfg.validate().expect("config validates");
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[daemon]\nport = 9100\n\n[workers]\nworker_timeout_secs = 60").unwrap();

    let cfg = Config::load_from(file.path()).expect("load");
    assert_eq!(cfg.daemon.port, 9100);
    assert_eq!(cfg.workers.worker_timeout_secs, 60);
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn malformed_toml_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[daemon\nport = ").unwrap();
    let err = Config::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn zero_max_pending_fails_validation() {
    let mut cfg = Config::default();
    cfg.admission.max_pending_review_units = 0;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("max_pending_review_units"));
}

#[test]
fn enabled_backlog_needs_repositories() {
    let mut cfg = Config::default();
    cfg.backlog.enabled = true;
    assert!(cfg.validate().is_err());

    cfg.backlog.repositories = vec!["not-a-repo".to_string()];
    let err = cfg.validate().expect_err("bad repo name");
    assert!(err.to_string().contains("owner/repo"));
}

#[test]
fn unknown_log_format_fails_validation() {
    let mut cfg = Config::default();
    cfg.general.log_format = "xml".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn oversized_durations_fail_validation() {
    let mut cfg = Config::default();
    cfg.workers.worker_retention_secs = 20_000_000_000_000_000;
    let err = cfg.validate().expect_err("retention out of range");
    assert!(err.to_string().contains("worker_retention_secs"));

    let mut cfg = Config::default();
    cfg.workers.worker_timeout_secs = u64::MAX;
    cfg.workers.worker_retention_secs = u64::MAX;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.workers.worker_retention_secs = MAX_DURATION_SECS;
    assert!(cfg.validate().is_ok());
}

#[test]
fn coordinator_clamps_unvalidated_durations() {
    let mut cfg = Config::default();
    cfg.workers.worker_timeout_secs = u64::MAX;
    cfg.workers.worker_retention_secs = u64::MAX;
    let mut c = Coordinator::new(&cfg);
    let now = chrono::Utc::now();
    c.ingest(vec![Task::new("a", "a")], now).unwrap();
    assert!(c.request_work(&WorkerId::from("w1"), None, now).task.is_some());

    let report = c.sweep(now + chrono::Duration::days(365));
    assert!(report.reclaimed.is_empty());
}
