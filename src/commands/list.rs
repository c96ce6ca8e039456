use std::str::FromStr as _;

use crate::commands::format_ts;
use crate::database::models::{job, job_state::JobState};
use crate::error::{QueueError, Result};
use crate::settings::Settings;
use crate::store::Store;

pub async fn handle_list_command(
    settings: &Settings,
    state: Option<&str>,
    limit: Option<u64>,
) -> Result<()> {
    let filter = state
        .map(|raw| {
            JobState::from_str(raw)
                .map_err(|_| QueueError::InvalidInput(format!("unknown state '{raw}'")))
        })
        .transpose()?;

    let store = Store::open(settings).await?;
    let jobs = store.list(filter, limit).await?;

    print_job_table(&jobs);
    Ok(())
}

fn print_job_table(jobs: &[job::Model]) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }

    println!(
        "{:<24} {:<11} {:>4} {:>8} {:<20} {}",
        "ID", "STATE", "PRIO", "ATTEMPTS", "NEXT RUN AT", "COMMAND"
    );
    for job in jobs {
        println!(
            "{:<24} {:<11} {:>4} {:>8} {:<20} {}",
            job.id,
            job.state.to_string(),
            job.priority,
            format!("{}/{}", job.attempts, job.max_retries + 1),
            format_ts(job.next_run_at),
            job.command
        );
    }
}
