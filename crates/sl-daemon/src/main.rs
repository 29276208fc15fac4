//! `sluice-daemon`: the coordinator daemon binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sl_core::config::Config;
use sl_daemon::daemon::Daemon;
use sl_integrations::github::GitHubBacklog;
use sl_telemetry::logging::{self, LogFormat};
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "sluice-daemon", version, about = "sluice work-dispatch coordinator")]
struct Args {
    /// Config file (default: ~/.sluice/config.toml)
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `daemon.port`
    #[arg(short, long)]
    port: Option<u16>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = load_config(args.config.as_ref())?;
    if let Some(port) = args.port {
        config.daemon.port = port;
    }

    logging::init(
        "sluice-daemon",
        &config.general.log_level,
        LogFormat::from_name(&config.general.log_format),
    );
    info!(
        project = %config.general.project_name,
        version = env!("CARGO_PKG_VERSION"),
        "sluice daemon starting"
    );

    let mut daemon = Daemon::new(config.clone()).await?;
    if config.backlog.enabled {
        let backlog = GitHubBacklog::from_config(&config.backlog)
            .context("failed to set up the GitHub backlog")?;
        info!(repositories = ?backlog.repositories(), "backlog intake enabled");
        daemon = daemon.with_backlog(Arc::new(backlog));
    }

    daemon.shutdown_handle().trigger_on_ctrl_c();
    daemon.run().await
}
