use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sl_bridge::http_api::{api_router_with_auth, ApiState};
use sl_core::cache::CacheDb;
use sl_core::config::Config;
use sl_core::scheduler::{Coordinator, Scheduler};
use sl_integrations::backlog::Backlog;
use sl_integrations::projection::LabelScheme;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::intake::{intake_loop, IntakeRunner};
use crate::patrol::sweep_loop;
use crate::projection::projection_loop;
use crate::shutdown::ShutdownSignal;

/// Background loop intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonIntervals {
    /// Liveness sweep (default: 30s).
    pub sweep_secs: u64,
    /// Backlog poll (default: 60s).
    pub intake_secs: u64,
}

impl Default for DaemonIntervals {
    fn default() -> Self {
        Self {
            sweep_secs: 30,
            intake_secs: 60,
        }
    }
}

impl From<&Config> for DaemonIntervals {
    fn from(config: &Config) -> Self {
        Self {
            sweep_secs: config.workers.sweep_interval_secs.max(1),
            intake_secs: config.backlog.poll_interval_secs.max(1),
        }
    }
}

/// The coordinator daemon.
///
/// Owns the scheduler, serves the HTTP API and runs the sweep, intake and
/// projection loops until the [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    scheduler: Arc<Scheduler>,
    backlog: Option<Arc<dyn Backlog>>,
    intervals: DaemonIntervals,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Daemon around an existing scheduler.
    pub fn with_scheduler(config: Config, scheduler: Arc<Scheduler>) -> Self {
        let intervals = DaemonIntervals::from(&config);
        Self {
            config,
            scheduler,
            backlog: None,
            intervals,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Open the journal named in the config and restore from it. With the
    /// cache disabled, state lives in memory only.
    pub async fn new(config: Config) -> Result<Self> {
        let scheduler = if config.cache.enabled {
            let path = config.cache.resolved_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let db = CacheDb::new(&path)
                .await
                .with_context(|| format!("failed to open cache database {}", path.display()))?;
            Scheduler::restore(&config, Arc::new(db))
                .await
                .context("failed to restore scheduler state")?
        } else {
            info!("cache disabled, scheduler state is not persisted");
            Scheduler::new(Coordinator::new(&config))
        };
        Ok(Self::with_scheduler(config, Arc::new(scheduler)))
    }

    /// Attach a backlog for intake and label projection.
    pub fn with_backlog(mut self, backlog: Arc<dyn Backlog>) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn set_intervals(&mut self, intervals: DaemonIntervals) {
        self.intervals = intervals;
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn spawn_background_loops(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        handles.push(tokio::spawn(sweep_loop(
            self.scheduler.clone(),
            Duration::from_secs(self.intervals.sweep_secs),
            self.shutdown.clone(),
        )));

        if let Some(backlog) = &self.backlog {
            let events = self.scheduler.event_bus().subscribe();
            handles.push(tokio::spawn(projection_loop(
                events,
                backlog.clone(),
                LabelScheme::from(&self.config.backlog),
                self.shutdown.clone(),
            )));

            let runner = IntakeRunner::from_config(backlog.clone(), &self.config.backlog);
            handles.push(tokio::spawn(intake_loop(
                self.scheduler.clone(),
                runner,
                Duration::from_secs(self.intervals.intake_secs),
                self.shutdown.clone(),
            )));
        }

        handles
    }

    /// Serve on a pre-bound listener until shutdown (blocking).
    ///
    /// Binding is left to the caller so tests can use `127.0.0.1:0`.
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let bind_addr = listener.local_addr()?;
        let api_key = self.config.security.api_key();
        if api_key.is_some() {
            info!("API key configured, authentication enabled");
        }

        let state = Arc::new(ApiState::new(
            self.scheduler.clone(),
            self.config.workers.poll_backoff_secs,
        ));
        let router = api_router_with_auth(state, api_key);

        info!(
            sweep_secs = self.intervals.sweep_secs,
            intake_secs = self.intervals.intake_secs,
            backlog = self.backlog.is_some(),
            "daemon starting background loops"
        );
        let loops = self.spawn_background_loops();

        info!(%bind_addr, "API server listening");
        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;
        if let Err(e) = &served {
            error!(error = %e, "API server error");
            self.shutdown.trigger();
        }

        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "background loop panicked");
            }
        }
        info!("daemon stopped");
        served.context("API server failed")
    }

    /// Bind `daemon.host:daemon.port` and serve until shutdown (blocking).
    pub async fn run(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.daemon.host, self.config.daemon.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }
}
