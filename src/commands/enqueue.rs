use crate::commands::format_ts;
use crate::error::{QueueError, Result};
use crate::settings::Settings;
use crate::store::{JobSpec, Store};

pub async fn handle_enqueue_command(settings: &Settings, raw: &str) -> Result<()> {
    let spec: JobSpec = serde_json::from_str(raw)
        .map_err(|e| QueueError::InvalidInput(format!("invalid job spec: {e}")))?;

    let store = Store::open(settings).await?;
    let job = store.enqueue(spec).await?;

    println!(
        "enqueued job '{}' (priority {}, eligible at {})",
        job.id,
        job.priority,
        format_ts(job.next_run_at)
    );
    Ok(())
}
