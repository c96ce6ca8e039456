use std::fs;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::settings::Settings;
use crate::store::{self, Store};

/// How long `stop` and the shutdown path wait for workers to finish their
/// current attempt before force-killing them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

const ALIVENESS_POLL: Duration = Duration::from_millis(200);

/// Run a pool of `count` workers in the foreground until interrupted.
///
/// Workers are independent OS processes (the binary re-executed with the
/// hidden `worker run` subcommand) so one crashing command cannot take down
/// its peers. Their pids are recorded in `<data_dir>/workers.pid`; a live
/// pid file from another supervisor refuses startup.
pub async fn start(settings: &Settings, store: &Store, count: u32) -> Result<()> {
    ensure_not_running(settings)?;

    let mut children = spawn_workers(settings, count)?;
    let pids: Vec<i32> = children.iter().filter_map(child_pid).collect();
    write_pid_file(settings, &pids)?;
    info!("🚀 started {} worker(s): {:?}", children.len(), pids);

    supervise(store, &mut children).await;

    let _ = fs::remove_file(settings.pid_file());
    info!("supervisor stopped");
    Ok(())
}

/// Signal the recorded workers to stop and wait for them to go away.
/// Returns how many live workers were signalled.
pub async fn stop(settings: &Settings) -> Result<usize> {
    let recorded = read_pid_file(settings)?;
    let live: Vec<i32> = recorded.into_iter().filter(|&pid| pid_is_alive(pid)).collect();
    if live.is_empty() {
        let _ = fs::remove_file(settings.pid_file());
        return Ok(0);
    }

    for &pid in &live {
        debug!("sending SIGTERM to worker pid {}", pid);
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while Instant::now() < deadline {
        if !live.iter().any(|&pid| pid_is_alive(pid)) {
            let _ = fs::remove_file(settings.pid_file());
            return Ok(live.len());
        }
        sleep(ALIVENESS_POLL).await;
    }

    for &pid in &live {
        if pid_is_alive(pid) {
            warn!("worker pid {} ignored SIGTERM; killing", pid);
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
    }
    let _ = fs::remove_file(settings.pid_file());
    Ok(live.len())
}

/// True when the pid file names at least one live worker.
pub fn is_running(settings: &Settings) -> Result<bool> {
    Ok(read_pid_file(settings)?
        .into_iter()
        .any(pid_is_alive))
}

/// Refuse to start over a live pool; silently replace a stale pid file.
fn ensure_not_running(settings: &Settings) -> Result<()> {
    let recorded = read_pid_file(settings)?;
    let live: Vec<i32> = recorded
        .iter()
        .copied()
        .filter(|&pid| pid_is_alive(pid))
        .collect();
    if !live.is_empty() {
        return Err(QueueError::InvalidState(format!(
            "workers already running (pids {:?}); run 'worker stop' first",
            live
        )));
    }
    if !recorded.is_empty() {
        warn!(
            "removing stale pid file {}",
            settings.pid_file().display()
        );
        let _ = fs::remove_file(settings.pid_file());
    }
    Ok(())
}

fn spawn_workers(settings: &Settings, count: u32) -> Result<Vec<Child>> {
    let exe = std::env::current_exe()?;
    let mut children = Vec::with_capacity(count as usize);
    for index in 0..count {
        let child = Command::new(&exe)
            .arg("--data-dir")
            .arg(&settings.data_dir)
            .arg("worker")
            .arg("run")
            .arg("--index")
            .arg(index.to_string())
            .stdin(Stdio::null())
            .spawn()?;
        debug!("spawned worker {} (pid {:?})", index, child.id());
        children.push(child);
    }
    Ok(children)
}

/// The supervisor's foreground loop: periodic store maintenance plus child
/// bookkeeping, until an interrupt arrives or every worker is gone.
///
/// Reactivation runs here rather than in each worker so one process issues
/// the sweep instead of N.
async fn supervise(store: &Store, children: &mut Vec<Child>) {
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("cannot install SIGINT handler: {}", e);
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("cannot install SIGTERM handler: {}", e);
            return;
        }
    };

    let cfg = match store.config().load().await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("could not load config, using defaults: {}", e);
            QueueConfig::default()
        }
    };
    let mut tick = interval(cfg.poll_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                sweep(store, &cfg).await;
                reap_exited(children);
                if children.is_empty() {
                    info!("all workers have exited");
                    return;
                }
            }
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
        }
    }

    info!("🛑 interrupt received; stopping workers");
    terminate_children(children).await;
}

/// One maintenance pass: hoist retry-ready jobs, then recover orphaned
/// claims when the operator has enabled that.
async fn sweep(store: &Store, cfg: &QueueConfig) {
    let now = store::now();

    match store.move_failed_to_pending(now).await {
        Ok(0) => {}
        Ok(moved) => debug!("reactivated {} retry-ready job(s)", moved),
        Err(e) => warn!("reactivation sweep failed: {}", e),
    }

    if let Some(age) = cfg.orphan_timeout() {
        #[allow(clippy::cast_possible_wrap)]
        let age_secs = age.as_secs() as i64;
        match store.requeue_orphans(now, age_secs).await {
            Ok(0) => {}
            Ok(moved) => info!("🏥 requeued {} orphaned job(s)", moved),
            Err(e) => warn!("orphan sweep failed: {}", e),
        }
    }
}

fn reap_exited(children: &mut Vec<Child>) {
    children.retain_mut(|child| match child.try_wait() {
        Ok(None) => true,
        Ok(Some(status)) => {
            warn!("worker exited with {}", status);
            false
        }
        Err(e) => {
            error!("could not poll worker: {}", e);
            true
        }
    });
}

async fn terminate_children(children: &mut Vec<Child>) {
    for child in children.iter() {
        if let Some(pid) = child_pid(child) {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while Instant::now() < deadline {
        reap_exited(children);
        if children.is_empty() {
            info!("all workers exited cleanly");
            return;
        }
        sleep(ALIVENESS_POLL).await;
    }

    for child in children.iter_mut() {
        warn!("worker pid {:?} did not stop within grace; killing", child.id());
        let _ = child.kill().await;
    }
    children.clear();
}

fn child_pid(child: &Child) -> Option<i32> {
    child.id().and_then(|pid| i32::try_from(pid).ok())
}

/// Probe with signal 0: delivers nothing, reports existence.
fn pid_is_alive(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

fn read_pid_file(settings: &Settings) -> Result<Vec<i32>> {
    let path = settings.pid_file();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path)?;
    Ok(contents
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect())
}

fn write_pid_file(settings: &Settings, pids: &[i32]) -> Result<()> {
    let lines: Vec<String> = pids.iter().map(ToString::to_string).collect();
    fs::write(settings.pid_file(), lines.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings() -> (tempfile::TempDir, Settings) {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::new(tmp.path());
        settings.ensure_layout().unwrap();
        (tmp, settings)
    }

    #[test]
    fn test_pid_file_round_trips() {
        let (_tmp, settings) = temp_settings();
        write_pid_file(&settings, &[101, 102, 103]).unwrap();
        assert_eq!(read_pid_file(&settings).unwrap(), vec![101, 102, 103]);
    }

    #[test]
    fn test_missing_pid_file_reads_empty() {
        let (_tmp, settings) = temp_settings();
        assert_eq!(read_pid_file(&settings).unwrap(), Vec::<i32>::new());
        assert!(!is_running(&settings).unwrap());
    }

    #[test]
    fn test_pid_liveness_probe() {
        #[allow(clippy::cast_possible_wrap)]
        let own = std::process::id() as i32;
        assert!(pid_is_alive(own));
        // Far beyond any realistic pid_max.
        assert!(!pid_is_alive(2_000_000_000));
    }

    #[test]
    fn test_start_refuses_while_workers_live() {
        let (_tmp, settings) = temp_settings();
        #[allow(clippy::cast_possible_wrap)]
        let own = std::process::id() as i32;
        write_pid_file(&settings, &[own]).unwrap();

        let err = ensure_not_running(&settings).unwrap_err();
        assert!(matches!(err, QueueError::InvalidState(_)));
    }

    #[test]
    fn test_stale_pid_file_is_replaced() {
        let (_tmp, settings) = temp_settings();
        write_pid_file(&settings, &[2_000_000_000]).unwrap();

        ensure_not_running(&settings).unwrap();
        assert!(!settings.pid_file().exists());
    }
}
