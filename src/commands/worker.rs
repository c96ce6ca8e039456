use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::cli::WorkerAction;
use crate::error::{QueueError, Result};
use crate::jobs::{supervisor, worker, worker_name};
use crate::settings::Settings;
use crate::store::Store;

pub async fn handle_worker_command(settings: &Settings, action: WorkerAction) -> Result<()> {
    match action {
        WorkerAction::Start { count } => {
            if count == 0 {
                return Err(QueueError::InvalidInput("--count must be at least 1".into()));
            }
            let store = Store::open(settings).await?;
            supervisor::start(settings, &store, count).await
        }
        WorkerAction::Stop => {
            let signalled = supervisor::stop(settings).await?;
            if signalled == 0 {
                println!("no running workers");
            } else {
                println!("stopped {signalled} worker(s)");
            }
            Ok(())
        }
        WorkerAction::Run { index } => {
            let store = Store::open(settings).await?;
            let shutdown = shutdown_channel()?;
            worker::run(worker_name(index), store, shutdown).await
        }
    }
}

/// Flip to `true` on the first SIGINT or SIGTERM; the worker loop finishes
/// its current attempt before acting on it.
fn shutdown_channel() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        let _ = tx.send(true);
    });

    Ok(rx)
}
