use std::path::{Path, PathBuf};

const DB_FILE: &str = "queuectl.db";
const LOGS_DIR: &str = "logs";
const PID_FILE: &str = "workers.pid";

/// Process-level settings.
///
/// Everything queuectl persists lives under `data_dir`: the SQLite database,
/// captured job output, and the supervisor's pid file. The queue's tunables
/// (retries, backoff, polling) live inside the store itself — see
/// [`crate::config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// SQLite connection URL; `mode=rwc` creates the file on first open.
    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path().display())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir.join(PID_FILE)
    }

    /// Deterministic per-job capture paths. Does not create the files.
    pub fn log_paths_for(&self, job_id: &str) -> (PathBuf, PathBuf) {
        let dir = self.logs_dir();
        (
            dir.join(format!("{job_id}.stdout.log")),
            dir.join(format!("{job_id}.stderr.log")),
        )
    }

    /// Create the on-disk layout if it does not exist yet.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.logs_dir())
    }
}

impl AsRef<Path> for Settings {
    fn as_ref(&self) -> &Path {
        &self.data_dir
    }
}
