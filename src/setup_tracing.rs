use time::format_description::parse;
use tracing_subscriber::fmt::time::UtcTime;

use crate::cli::{Commands, WorkerAction};

pub fn setup_tracing_for_command(command: &Commands) {
    // Worker processes need operational visibility; one-shot commands keep
    // their stdout clean and only surface warnings. RUST_LOG overrides
    // either way.
    let default_level = match command {
        Commands::Worker {
            action: WorkerAction::Start { .. } | WorkerAction::Run { .. },
        } => "info",
        _ => "warn",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
        // sqlx and the migrator narrate every statement at info
        .add_directive("sqlx=warn".parse().unwrap())
        .add_directive("sea_orm_migration::migrator=warn".parse().unwrap());

    // Workers from one pool interleave on the supervisor's terminal; UTC
    // wall-clock timestamps keep their lines comparable with each other and
    // with the timestamps the store writes.
    let utc_seconds = UtcTime::new(
        parse("[year]-[month]-[day]T[hour]:[minute]:[second]Z").unwrap(),
    );

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(utc_seconds)
        .with_target(false)
        .compact()
        .init();
}
