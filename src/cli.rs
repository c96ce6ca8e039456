use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Directory holding the queue database, captured logs, and pid file
    #[arg(
        long,
        global = true,
        env = "QUEUECTL_DATA_DIR",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a job to the queue from a JSON spec
    Enqueue {
        /// JSON object with at least "id" and "command"
        spec: String,
    },
    /// Worker pool management
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Show job counts per state
    Status,
    /// List jobs, optionally filtered by state
    List {
        /// Only jobs in this state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<String>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Dead letter queue management
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Queue configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the captured output paths for a job
    Logs { id: String },
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Start a worker pool in the foreground; blocks until interrupted
    Start {
        /// Number of worker processes
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Signal the running worker pool to stop
    Stop,
    /// A single worker process (spawned by `worker start`)
    #[command(hide = true)]
    Run {
        #[arg(long)]
        index: u32,
    },
}

#[derive(Subcommand)]
pub enum DlqAction {
    /// List jobs parked in the dead letter queue
    List,
    /// Move a dead job back to pending with a fresh retry budget
    Retry { id: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration key
    Set { key: String, value: String },
    /// Print one configuration value
    Get { key: String },
    /// Print all configuration values
    Show,
}
