use std::process::ExitCode;

use clap::Parser as _;
use tracing::debug;

use crate::{
    cli::{Cli, Commands},
    commands::{config, dlq, enqueue, list, logs, status, worker},
    error::Result,
    settings::Settings,
    setup_tracing::setup_tracing_for_command,
};

/// CLI entry point: parse, set up tracing, dispatch, map errors to exit
/// codes. Errors surface as a single line on stderr.
pub async fn boot() -> ExitCode {
    let cli = Cli::parse();

    setup_tracing_for_command(&cli.command);

    let settings = Settings::new(&cli.data_dir);
    debug!("data directory: {}", settings.data_dir.display());

    match dispatch(settings, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(settings: Settings, command: Commands) -> Result<()> {
    match command {
        Commands::Enqueue { spec } => enqueue::handle_enqueue_command(&settings, &spec).await,
        Commands::Worker { action } => worker::handle_worker_command(&settings, action).await,
        Commands::Status => status::handle_status_command(&settings).await,
        Commands::List { state, limit } => {
            list::handle_list_command(&settings, state.as_deref(), limit).await
        }
        Commands::Dlq { action } => dlq::handle_dlq_command(&settings, action).await,
        Commands::Config { action } => config::handle_config_command(&settings, action).await,
        Commands::Logs { id } => logs::handle_logs_command(&settings, &id),
    }
}
