use strum::IntoEnumIterator;

use crate::database::models::job_state::JobState;
use crate::error::Result;
use crate::settings::Settings;
use crate::store::Store;

pub async fn handle_status_command(settings: &Settings) -> Result<()> {
    let store = Store::open(settings).await?;
    let stats = store.stats().await?;

    println!("{:<12} {:>8}", "STATE", "COUNT");
    for state in JobState::iter() {
        println!(
            "{:<12} {:>8}",
            state.to_string(),
            stats.get(&state).copied().unwrap_or(0)
        );
    }
    Ok(())
}
