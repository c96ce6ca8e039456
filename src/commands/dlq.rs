use crate::cli::DlqAction;
use crate::database::models::job_state::JobState;
use crate::error::Result;
use crate::settings::Settings;
use crate::store::Store;

pub async fn handle_dlq_command(settings: &Settings, action: DlqAction) -> Result<()> {
    let store = Store::open(settings).await?;
    match action {
        DlqAction::List => {
            let dead = store.list(Some(JobState::Dead), None).await?;
            if dead.is_empty() {
                println!("dead letter queue is empty");
                return Ok(());
            }
            println!("{:<24} {:>8} {}", "ID", "ATTEMPTS", "LAST ERROR");
            for job in dead {
                println!(
                    "{:<24} {:>8} {}",
                    job.id,
                    job.attempts,
                    job.last_error.as_deref().unwrap_or("-")
                );
            }
        }
        DlqAction::Retry { id } => {
            let job = store.retry_from_dlq(&id).await?;
            println!("job '{}' moved back to pending", job.id);
        }
    }
    Ok(())
}
