use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::database::models::{job, job_state::JobState, run_outcome::RunOutcome};
use crate::error::QueueError;
use crate::store::{self, RunRecord, Store};

/// Sleep applied when the store itself is unreachable, so a broken database
/// does not turn the claim loop into a busy spin.
const STORE_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Attempts at reporting an outcome before the run record is given up on.
const REPORT_ATTEMPTS: u32 = 3;
const REPORT_BACKOFF_MS: u64 = 200;

/// One long-lived execution loop: claim, run, report, repeat.
///
/// The loop only observes `shutdown` between jobs; an in-flight attempt
/// always finishes and reports before the worker exits.
pub async fn run(
    worker_name: String,
    store: Store,
    mut shutdown: watch::Receiver<bool>,
) -> crate::error::Result<()> {
    info!("worker '{}' started", worker_name);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let cfg = match store.config().load().await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("worker '{}' could not load config: {}", worker_name, e);
                sleep(STORE_RETRY_PAUSE).await;
                continue;
            }
        };

        let claimed = match store.claim_next(&worker_name, store::now()).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!("worker '{}' claim failed: {}", worker_name, e);
                sleep(STORE_RETRY_PAUSE).await;
                continue;
            }
        };

        let Some(job) = claimed else {
            // Nothing eligible; doze until the next poll or a stop signal.
            tokio::select! {
                () = sleep(cfg.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        };

        debug!("🔧 worker '{}' claimed job '{}'", worker_name, job.id);
        let execution = execute(&job, &cfg, &store, &worker_name).await;
        report(&job, execution, &cfg, &store, &worker_name).await;
    }

    info!("worker '{}' stopped", worker_name);
    Ok(())
}

/// Outcome of one subprocess execution, before it is recorded.
pub(crate) struct Execution {
    pub record: RunRecord,
    pub success: bool,
}

/// Run the job's command through the platform shell with both streams
/// captured to the job's log files, bounded by its wall-clock limit.
///
/// Never fails: anything that prevents the command from running (log file
/// creation, spawn) becomes a failed attempt with the diagnostic preserved.
pub(crate) async fn execute(
    job: &job::Model,
    cfg: &QueueConfig,
    store: &Store,
    worker_name: &str,
) -> Execution {
    let (stdout_path, stderr_path) = store.log_paths_for(&job.id);
    let limit = job.timeout(cfg.default_timeout);

    let started_at = store::now();
    let started = Instant::now();

    let spawned = std::fs::File::create(&stdout_path)
        .and_then(|stdout| Ok((stdout, std::fs::File::create(&stderr_path)?)))
        .and_then(|(stdout, stderr)| spawn_shell(&job.command, stdout, stderr));

    let (outcome, exit_code, failure) = match spawned {
        Err(e) => (RunOutcome::Failure, None, Some(format!("spawn failed: {e}"))),
        Ok(mut child) => match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => {
                let outcome = if status.success() {
                    RunOutcome::Success
                } else {
                    RunOutcome::Failure
                };
                (outcome, status.code(), None)
            }
            Ok(Err(e)) => (RunOutcome::Failure, None, Some(format!("wait failed: {e}"))),
            Err(_) => {
                kill_process_tree(&mut child).await;
                let secs = limit.as_secs();
                (
                    RunOutcome::Timeout,
                    None,
                    Some(format!("timed out after {secs}s")),
                )
            }
        },
    };

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = started.elapsed().as_millis() as i64;

    Execution {
        success: outcome.is_success(),
        record: RunRecord {
            started_at,
            finished_at: store::now(),
            duration_ms,
            exit_code,
            stdout_bytes: file_size(&stdout_path),
            stderr_bytes: file_size(&stderr_path),
            worker_name: worker_name.to_owned(),
            outcome,
            error: failure,
        },
    }
}

/// Report the outcome, retrying transient storage errors a bounded number
/// of times. Losing a run record is preferable to wedging the worker.
async fn report(
    job: &job::Model,
    execution: Execution,
    cfg: &QueueConfig,
    store: &Store,
    worker_name: &str,
) {
    for attempt in 0..REPORT_ATTEMPTS {
        let result = if execution.success {
            store.complete(&job.id, execution.record.clone()).await
        } else {
            store
                .reschedule_or_dead(&job.id, execution.record.clone(), cfg)
                .await
        };

        match result {
            Ok(updated) => {
                match updated.state {
                    JobState::Completed => info!(
                        "✅ worker '{}' completed job '{}' in {}ms",
                        worker_name, job.id, execution.record.duration_ms
                    ),
                    JobState::Failed => warn!(
                        "⚠️ worker '{}' failed job '{}' (attempt {}); retry at {}",
                        worker_name, job.id, updated.attempts, updated.next_run_at
                    ),
                    JobState::Dead => error!(
                        "❌ worker '{}' exhausted retries for job '{}'; moved to DLQ",
                        worker_name, job.id
                    ),
                    _ => {}
                }
                return;
            }
            Err(QueueError::Storage(e)) if attempt + 1 < REPORT_ATTEMPTS => {
                let pause = REPORT_BACKOFF_MS * u64::from(attempt + 1)
                    + fastrand::u64(0..REPORT_BACKOFF_MS);
                warn!(
                    "worker '{}' could not report job '{}' ({}); retrying in {}ms",
                    worker_name, job.id, e, pause
                );
                sleep(Duration::from_millis(pause)).await;
            }
            Err(e) => {
                error!(
                    "💥 worker '{}' lost the outcome of job '{}': {}",
                    worker_name, job.id, e
                );
                return;
            }
        }
    }
}

fn spawn_shell(
    command: &str,
    stdout: std::fs::File,
    stderr: std::fs::File,
) -> std::io::Result<Child> {
    let mut cmd = platform_shell(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    // The command leads its own process group so a timeout can take down
    // everything it spawned, not just the shell.
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

#[cfg(unix)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
async fn kill_process_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        // Negative pid addresses the whole process group.
        #[allow(clippy::cast_possible_wrap)]
        let pgid = -(pid as i32);
        unsafe {
            libc::kill(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn kill_process_tree(child: &mut Child) {
    let _ = child.kill().await;
}

#[allow(clippy::cast_possible_wrap)]
fn file_size(path: &std::path::Path) -> i64 {
    std::fs::metadata(path).map_or(0, |meta| meta.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::store::JobSpec;

    fn spec(id: &str, command: &str) -> JobSpec {
        JobSpec {
            id: id.to_owned(),
            command: command.to_owned(),
            priority: None,
            max_retries: None,
            timeout_secs: None,
            run_at: None,
        }
    }

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::new(tmp.path());
        let store = Store::open(&settings).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_execute_captures_stdout_and_exit_code() {
        let (_tmp, store) = temp_store().await;
        store.enqueue(spec("a", "echo hello")).await.unwrap();
        let job = store.claim_next("w1", store::now()).await.unwrap().unwrap();

        let execution = execute(&job, &QueueConfig::default(), &store, "w1").await;
        assert!(execution.success);
        assert_eq!(execution.record.exit_code, Some(0));
        assert_eq!(execution.record.outcome, RunOutcome::Success);
        assert!(execution.record.stdout_bytes > 0);
        assert_eq!(execution.record.stderr_bytes, 0);

        let (stdout_path, _) = store.log_paths_for("a");
        let captured = std::fs::read_to_string(stdout_path).unwrap();
        assert_eq!(captured.trim(), "hello");
    }

    #[tokio::test]
    async fn test_execute_reports_nonzero_exit() {
        let (_tmp, store) = temp_store().await;
        store.enqueue(spec("b", "exit 3")).await.unwrap();
        let job = store.claim_next("w1", store::now()).await.unwrap().unwrap();

        let execution = execute(&job, &QueueConfig::default(), &store, "w1").await;
        assert!(!execution.success);
        assert_eq!(execution.record.exit_code, Some(3));
        assert_eq!(execution.record.outcome, RunOutcome::Failure);
    }

    #[tokio::test]
    async fn test_execute_kills_on_timeout() {
        let (_tmp, store) = temp_store().await;
        let mut slow = spec("t", "sleep 10");
        slow.timeout_secs = Some(1);
        store.enqueue(slow).await.unwrap();
        let job = store.claim_next("w1", store::now()).await.unwrap().unwrap();

        let started = Instant::now();
        let execution = execute(&job, &QueueConfig::default(), &store, "w1").await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(execution.record.outcome, RunOutcome::Timeout);
        assert_eq!(execution.record.exit_code, None);
        assert!(execution.record.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_loop_completes_a_job_and_stops() {
        let (_tmp, store) = temp_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run("w-test".to_owned(), store.clone(), stop_rx));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let job = store.get("a").await.unwrap();
            if job.state == JobState::Completed {
                assert_eq!(job.attempts, 1);
                break;
            }
            assert!(Instant::now() < deadline, "job never completed");
            sleep(Duration::from_millis(100)).await;
        }

        let runs = store.runs_for("a").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Success);
        assert_eq!(runs[0].worker_name, "w-test");

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
