mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sl_core::types::{Outcome, ReviewState, TaskStatus};

use commands::ApiClient;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// sluice CLI -- talk to the work-dispatch coordinator.
#[derive(Parser)]
#[command(name = "sluice", version, about)]
struct Cli {
    /// Coordinator base URL.
    #[arg(long, env = "SLUICE_URL", default_value = "http://127.0.0.1:8000", global = true)]
    url: String,

    /// API key sent as `X-API-Key`.
    #[arg(long, env = "SLUICE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show admission state, queue counts and workers (default).
    Status,

    /// Ask for the next task as a worker.
    Request {
        worker: String,
        /// Only accept tasks carrying one of these tags.
        #[arg(short, long, value_delimiter = ',')]
        specialization: Vec<String>,
    },

    /// Mark an assigned task as started.
    Start { worker: String, task: String },

    /// Report the outcome of a task.
    Report {
        worker: String,
        task: String,
        outcome: OutcomeArg,
        /// Review URL on success, error text on failure.
        #[arg(short, long)]
        detail: Option<String>,
    },

    /// Give a task back to the queue without counting a retry.
    Release { worker: String, task: String },

    /// Send a liveness heartbeat.
    Heartbeat {
        worker: String,
        /// Task the worker is currently on.
        #[arg(short, long)]
        task: Option<String>,
    },

    /// Record a review disposition for a completed task.
    Dispose { task: String, state: ReviewStateArg },

    /// Ingest a JSON file of task descriptors as one batch.
    Ingest { file: PathBuf },

    /// List tasks.
    Tasks {
        #[arg(short, long)]
        status: Option<StatusArg>,
    },

    /// Show one task.
    Show { task: String },

    /// Remove a completed or failed task.
    Archive { task: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Completed,
    Failed,
    Released,
}

impl From<OutcomeArg> for Outcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Completed => Outcome::Completed,
            OutcomeArg::Failed => Outcome::Failed,
            OutcomeArg::Released => Outcome::Released,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReviewStateArg {
    Pending,
    ChangesRequested,
    Approved,
    Merged,
    Closed,
}

impl From<ReviewStateArg> for ReviewState {
    fn from(arg: ReviewStateArg) -> Self {
        match arg {
            ReviewStateArg::Pending => ReviewState::Pending,
            ReviewStateArg::ChangesRequested => ReviewState::ChangesRequested,
            ReviewStateArg::Approved => ReviewState::Approved,
            ReviewStateArg::Merged => ReviewState::Merged,
            ReviewStateArg::Closed => ReviewState::Closed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Queued => TaskStatus::Queued,
            StatusArg::Assigned => TaskStatus::Assigned,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::Completed => TaskStatus::Completed,
            StatusArg::Failed => TaskStatus::Failed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.url, cli.api_key.as_deref())?;

    match cli.command {
        None | Some(Commands::Status) => commands::status::run(&api).await?,
        Some(Commands::Request {
            worker,
            specialization,
        }) => {
            commands::work::request(&api, &worker, specialization).await?;
        }
        Some(Commands::Start { worker, task }) => {
            commands::work::start(&api, &worker, &task).await?;
        }
        Some(Commands::Report {
            worker,
            task,
            outcome,
            detail,
        }) => {
            commands::work::report(&api, &worker, &task, outcome.into(), detail).await?;
        }
        Some(Commands::Release { worker, task }) => {
            commands::work::release(&api, &worker, &task).await?;
        }
        Some(Commands::Heartbeat { worker, task }) => {
            commands::work::heartbeat(&api, &worker, task.as_deref()).await?;
        }
        Some(Commands::Dispose { task, state }) => {
            commands::review::dispose(&api, &task, state.into()).await?;
        }
        Some(Commands::Ingest { file }) => {
            commands::tasks::ingest(&api, &file).await?;
        }
        Some(Commands::Tasks { status }) => {
            commands::tasks::list(&api, status.map(Into::into)).await?;
        }
        Some(Commands::Show { task }) => {
            commands::tasks::show(&api, &task).await?;
        }
        Some(Commands::Archive { task }) => {
            commands::tasks::archive(&api, &task).await?;
        }
    }

    Ok(())
}
