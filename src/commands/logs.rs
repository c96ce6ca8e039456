use crate::error::Result;
use crate::settings::Settings;

/// Print the deterministic capture paths for a job. The files exist only
/// once a worker has run the job at least once.
pub fn handle_logs_command(settings: &Settings, id: &str) -> Result<()> {
    let (stdout_path, stderr_path) = settings.log_paths_for(id);
    println!("{}", stdout_path.display());
    println!("{}", stderr_path.display());
    Ok(())
}
