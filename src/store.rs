use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{NaiveDateTime, Timelike, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, SqlErr,
};
use serde::Deserialize;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::config::{ConfigStore, QueueConfig};
use crate::database::{
    self,
    models::{job, job_run, job_state::JobState, run_outcome::RunOutcome},
};
use crate::error::{QueueError, Result};
use crate::settings::Settings;

pub const DEFAULT_PRIORITY: i32 = 100;

/// Current UTC time at the store's resolution. Timestamps are persisted as
/// ISO-8601 text with whole seconds; truncating here keeps comparisons
/// between freshly computed and round-tripped values exact.
#[must_use]
pub fn now() -> NaiveDateTime {
    let t = Utc::now().naive_utc();
    t.with_nanosecond(0).unwrap_or(t)
}

/// Caller-facing description of a job to enqueue, as carried by the CLI's
/// JSON argument.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_retries: Option<i32>,
    #[serde(default)]
    pub timeout_secs: Option<i32>,
    /// Earliest start time, RFC 3339.
    #[serde(default)]
    pub run_at: Option<chrono::DateTime<Utc>>,
}

/// One finished execution attempt, as observed by a worker. The store
/// assigns the attempt ordinal when the record is written.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub duration_ms: i64,
    pub exit_code: Option<i32>,
    pub stdout_bytes: i64,
    pub stderr_bytes: i64,
    pub worker_name: String,
    pub outcome: RunOutcome,
    /// Worker-side diagnostic for failed attempts (spawn error, timeout);
    /// becomes the job's `last_error`.
    pub error: Option<String>,
}

/// Single source of truth for jobs, runs, and configuration. Every state
/// transition flows through here; workers never touch rows directly.
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
    settings: Settings,
}

impl Store {
    /// Open the store under `settings.data_dir`, creating the on-disk
    /// layout and migrating the schema as needed.
    pub async fn open(settings: &Settings) -> Result<Self> {
        settings.ensure_layout()?;
        let db = database::setup_database(settings).await?;
        Ok(Self {
            db,
            settings: settings.clone(),
        })
    }

    pub fn config(&self) -> ConfigStore {
        ConfigStore::new(self.db.clone())
    }

    /// Insert a new job in `pending` state.
    ///
    /// `max_retries` falls back to the configured default when the spec
    /// omits it; a requested `run_at` defers eligibility.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<job::Model> {
        if spec.id.trim().is_empty() {
            return Err(QueueError::InvalidInput("job id must not be empty".into()));
        }
        if spec.command.trim().is_empty() {
            return Err(QueueError::InvalidInput(
                "job command must not be empty".into(),
            ));
        }
        if spec.priority.is_some_and(|p| p < 0) {
            return Err(QueueError::InvalidInput(
                "priority must not be negative".into(),
            ));
        }
        if spec.max_retries.is_some_and(|m| m < 0) {
            return Err(QueueError::InvalidInput(
                "max_retries must not be negative".into(),
            ));
        }
        if spec.timeout_secs.is_some_and(|t| t <= 0) {
            return Err(QueueError::InvalidInput(
                "timeout_secs must be positive".into(),
            ));
        }

        let max_retries = match spec.max_retries {
            Some(max_retries) => max_retries,
            None => self.config().load().await?.max_retries,
        };

        let now = now();
        let run_at = spec.run_at.map(|t| {
            let t = t.naive_utc();
            t.with_nanosecond(0).unwrap_or(t)
        });

        let model = job::ActiveModel {
            id: Set(spec.id.clone()),
            command: Set(spec.command),
            state: Set(JobState::Pending),
            attempts: Set(0),
            max_retries: Set(max_retries),
            priority: Set(spec.priority.unwrap_or(DEFAULT_PRIORITY)),
            timeout_secs: Set(spec.timeout_secs),
            run_at: Set(run_at),
            next_run_at: Set(run_at.unwrap_or(now)),
            worker_name: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            last_error: Set(None),
        };

        match model.insert(&self.db).await {
            Ok(job) => Ok(job),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(QueueError::AlreadyExists(spec.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<job::Model> {
        job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_owned()))
    }

    /// Jobs ordered by dispatch priority, optionally filtered by state.
    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: Option<u64>,
    ) -> Result<Vec<job::Model>> {
        let mut query = job::Entity::find()
            .order_by_asc(job::Column::Priority)
            .order_by_asc(job::Column::CreatedAt)
            .order_by_asc(job::Column::Id);
        if let Some(state) = state {
            query = query.filter(job::Column::State.eq(state));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(&self.db).await?)
    }

    /// Atomically claim the highest-priority eligible pending job for
    /// `worker_name`, or return `None` when nothing is eligible.
    ///
    /// The claim itself is a conditional update keyed on `state='pending'`;
    /// under concurrent callers exactly one sees `rows_affected == 1` and
    /// the losers move on to the next candidate.
    pub async fn claim_next(
        &self,
        worker_name: &str,
        now: NaiveDateTime,
    ) -> Result<Option<job::Model>> {
        loop {
            let candidate = job::Entity::find()
                .filter(job::Column::State.eq(JobState::Pending))
                .filter(job::Column::NextRunAt.lte(now))
                .order_by_asc(job::Column::Priority)
                .order_by_asc(job::Column::CreatedAt)
                .order_by_asc(job::Column::Id)
                .limit(1)
                .one(&self.db)
                .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let claimed = job::Entity::update_many()
                .col_expr(job::Column::State, Expr::value(JobState::Processing))
                .col_expr(
                    job::Column::WorkerName,
                    Expr::value(Some(worker_name.to_owned())),
                )
                .col_expr(job::Column::UpdatedAt, Expr::value(now))
                .filter(job::Column::Id.eq(candidate.id.as_str()))
                .filter(job::Column::State.eq(JobState::Pending))
                .exec(&self.db)
                .await?;

            if claimed.rows_affected == 1 {
                return Ok(Some(self.get(&candidate.id).await?));
            }

            // A competitor won this row between select and update.
            debug!("lost claim race for job '{}', retrying", candidate.id);
        }
    }

    /// Record a successful attempt: `processing` → `completed`.
    pub async fn complete(&self, id: &str, run: RunRecord) -> Result<job::Model> {
        let job = self.expect_state(id, JobState::Processing).await?;

        let attempt = job.attempts + 1;
        self.record_run(id, attempt, &run).await?;

        let mut active: job::ActiveModel = job.into();
        active.state = Set(JobState::Completed);
        active.attempts = Set(attempt);
        active.worker_name = Set(None);
        active.last_error = Set(None);
        active.updated_at = Set(now());
        Ok(active.update(&self.db).await?)
    }

    /// Record a failed or timed-out attempt: `processing` → `failed` with a
    /// backoff-deferred `next_run_at`, or → `dead` once the retry budget is
    /// exhausted.
    pub async fn reschedule_or_dead(
        &self,
        id: &str,
        run: RunRecord,
        cfg: &QueueConfig,
    ) -> Result<job::Model> {
        let job = self.expect_state(id, JobState::Processing).await?;

        let attempt = job.attempts + 1;
        self.record_run(id, attempt, &run).await?;

        let last_error = run.error.clone().unwrap_or_else(|| match run.outcome {
            RunOutcome::Timeout => "execution timed out".to_owned(),
            _ => match run.exit_code {
                Some(code) => format!("command exited with status {code}"),
                None => "command terminated by signal".to_owned(),
            },
        });

        let now = now();
        let max_retries = job.max_retries;
        let mut active: job::ActiveModel = job.into();
        active.attempts = Set(attempt);
        active.worker_name = Set(None);
        active.last_error = Set(Some(last_error));
        active.updated_at = Set(now);
        if attempt <= max_retries {
            active.state = Set(JobState::Failed);
            active.next_run_at = Set(now + backoff_delay(cfg.backoff_base, attempt));
        } else {
            active.state = Set(JobState::Dead);
        }
        Ok(active.update(&self.db).await?)
    }

    /// Hoist every `failed` job whose backoff has elapsed back into the
    /// pending pool. One statement; applying it twice with the same clock
    /// is a no-op the second time.
    pub async fn move_failed_to_pending(&self, now: NaiveDateTime) -> Result<u64> {
        let moved = job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(JobState::Pending))
            .col_expr(job::Column::UpdatedAt, Expr::value(now))
            .filter(job::Column::State.eq(JobState::Failed))
            .filter(job::Column::NextRunAt.lte(now))
            .exec(&self.db)
            .await?;
        Ok(moved.rows_affected)
    }

    /// Explicit bookkeeping hook; the normal success and failure paths
    /// maintain `attempts` themselves.
    pub async fn increment_attempts(&self, id: &str) -> Result<()> {
        let updated = job::Entity::update_many()
            .col_expr(
                job::Column::Attempts,
                Expr::col(job::Column::Attempts).add(1),
            )
            .col_expr(job::Column::UpdatedAt, Expr::value(now()))
            .filter(job::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if updated.rows_affected == 0 {
            return Err(QueueError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    /// Give a dead job a fresh budget: `dead` → `pending`, `attempts` reset
    /// to zero, eligible immediately.
    pub async fn retry_from_dlq(&self, id: &str) -> Result<job::Model> {
        let job = self.expect_state(id, JobState::Dead).await?;

        let now = now();
        let mut active: job::ActiveModel = job.into();
        active.state = Set(JobState::Pending);
        active.attempts = Set(0);
        active.last_error = Set(None);
        active.next_run_at = Set(now);
        active.updated_at = Set(now);
        Ok(active.update(&self.db).await?)
    }

    /// Job counts per state, zero-filled so every state is present.
    pub async fn stats(&self) -> Result<HashMap<JobState, u64>> {
        let mut counts: HashMap<JobState, u64> = JobState::iter().map(|state| (state, 0)).collect();

        let rows: Vec<(JobState, i64)> = job::Entity::find()
            .select_only()
            .column(job::Column::State)
            .column_as(job::Column::Id.count(), "count")
            .group_by(job::Column::State)
            .into_tuple()
            .all(&self.db)
            .await?;

        for (state, count) in rows {
            counts.insert(state, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    /// Append one run record. Called by the terminal transitions above and
    /// usable directly for observability tooling.
    pub async fn record_run(&self, job_id: &str, attempt: i32, run: &RunRecord) -> Result<()> {
        let model = job_run::ActiveModel {
            job_id: Set(job_id.to_owned()),
            attempt: Set(attempt),
            started_at: Set(run.started_at),
            finished_at: Set(run.finished_at),
            duration_ms: Set(run.duration_ms),
            exit_code: Set(run.exit_code),
            stdout_bytes: Set(run.stdout_bytes),
            stderr_bytes: Set(run.stderr_bytes),
            worker_name: Set(run.worker_name.clone()),
            outcome: Set(run.outcome),
            ..Default::default()
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    /// Execution history for one job, oldest attempt first.
    pub async fn runs_for(&self, job_id: &str) -> Result<Vec<job_run::Model>> {
        Ok(job_run::Entity::find()
            .filter(job_run::Column::JobId.eq(job_id))
            .order_by_asc(job_run::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Deterministic capture paths for a job's output streams. Does not
    /// create the files.
    pub fn log_paths_for(&self, id: &str) -> (PathBuf, PathBuf) {
        self.settings.log_paths_for(id)
    }

    /// Return `processing` rows whose `updated_at` is older than
    /// `older_than_secs` to the pending pool. No run is recorded and
    /// `attempts` is untouched: the claim went silent, no attempt finished.
    pub async fn requeue_orphans(&self, now: NaiveDateTime, older_than_secs: i64) -> Result<u64> {
        let cutoff = now - chrono::Duration::seconds(older_than_secs);
        let moved = job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(JobState::Pending))
            .col_expr(job::Column::WorkerName, Expr::value(Option::<String>::None))
            .col_expr(
                job::Column::LastError,
                Expr::value(Some("requeued after its worker went silent".to_owned())),
            )
            .col_expr(job::Column::UpdatedAt, Expr::value(now))
            .filter(job::Column::State.eq(JobState::Processing))
            .filter(job::Column::UpdatedAt.lte(cutoff))
            .exec(&self.db)
            .await?;
        Ok(moved.rows_affected)
    }

    async fn expect_state(&self, id: &str, expected: JobState) -> Result<job::Model> {
        let job = self.get(id).await?;
        if job.state != expected {
            return Err(QueueError::InvalidState(format!(
                "job '{id}' is {}, expected {expected}",
                job.state
            )));
        }
        Ok(job)
    }
}

/// Delay before a rescheduled job becomes eligible again:
/// `base^(attempts-1)` seconds, where `attempts` already counts the attempt
/// that just failed.
fn backoff_delay(base: f64, attempts: i32) -> chrono::Duration {
    let secs = base.powi(attempts.saturating_sub(1));
    #[allow(clippy::cast_possible_truncation)]
    let secs = secs.round().min(i64::MAX as f64) as i64;
    chrono::Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::migrations::Migrator;
    use sea_orm_migration::MigratorTrait;

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

    fn run_record(worker: &str, outcome: RunOutcome, exit_code: Option<i32>) -> RunRecord {
        let now = now();
        RunRecord {
            started_at: now,
            finished_at: now,
            duration_ms: 5,
            exit_code,
            stdout_bytes: 0,
            stderr_bytes: 0,
            worker_name: worker.to_owned(),
            outcome,
            error: None,
        }
    }

    async fn memory_store() -> Store {
        let db = crate::database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Store {
            db,
            settings: Settings::new("/tmp/queuectl-test"),
        }
    }

    #[tokio::test]
    async fn test_enqueue_applies_defaults() {
        let store = memory_store().await;
        let job = store.enqueue(spec("a", "echo ok")).await.unwrap();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.priority, DEFAULT_PRIORITY);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.worker_name, None);
        assert_eq!(job.next_run_at, job.created_at);
    }

    #[tokio::test]
    async fn test_enqueue_round_trips_spec_fields() {
        let store = memory_store().await;
        let mut wanted = spec("a", "echo ok");
        wanted.priority = Some(7);
        wanted.max_retries = Some(1);
        wanted.timeout_secs = Some(30);
        store.enqueue(wanted).await.unwrap();

        let job = store.get("a").await.unwrap();
        assert_eq!(job.command, "echo ok");
        assert_eq!(job.priority, 7);
        assert_eq!(job.max_retries, 1);
        assert_eq!(job.timeout_secs, Some(30));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate_id() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();

        let err = store.enqueue(spec("a", "echo again")).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(id) if id == "a"));
    }

    #[tokio::test]
    async fn test_enqueue_validates_input() {
        let store = memory_store().await;
        assert!(matches!(
            store.enqueue(spec("", "echo ok")).await.unwrap_err(),
            QueueError::InvalidInput(_)
        ));
        assert!(matches!(
            store.enqueue(spec("a", "  ")).await.unwrap_err(),
            QueueError::InvalidInput(_)
        ));

        let mut bad_timeout = spec("a", "echo ok");
        bad_timeout.timeout_secs = Some(0);
        assert!(matches!(
            store.enqueue(bad_timeout).await.unwrap_err(),
            QueueError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_get_missing_job_is_not_found() {
        let store = memory_store().await;
        assert!(matches!(
            store.get("ghost").await.unwrap_err(),
            QueueError::NotFound(id) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_claim_follows_priority_then_id() {
        let store = memory_store().await;
        store.enqueue(spec("x", "echo x")).await.unwrap();
        let mut high = spec("y", "echo y");
        high.priority = Some(10);
        store.enqueue(high).await.unwrap();
        store.enqueue(spec("z", "echo z")).await.unwrap();

        let now = now();
        let first = store.claim_next("w1", now).await.unwrap().unwrap();
        let second = store.claim_next("w1", now).await.unwrap().unwrap();
        let third = store.claim_next("w1", now).await.unwrap().unwrap();
        assert_eq!(
            [first.id.as_str(), second.id.as_str(), third.id.as_str()],
            ["y", "x", "z"]
        );
        assert!(store.claim_next("w1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_stamps_worker_and_blocks_reclaim() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();

        let claimed = store.claim_next("w1", now()).await.unwrap().unwrap();
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.worker_name.as_deref(), Some("w1"));

        assert!(store.claim_next("w2", now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_deferred_run_at() {
        let store = memory_store().await;
        let mut deferred = spec("later", "echo ok");
        deferred.run_at = Some(Utc::now() + chrono::Duration::hours(1));
        let job = store.enqueue(deferred).await.unwrap();
        assert!(job.next_run_at > now());

        assert!(store.claim_next("w1", now()).await.unwrap().is_none());

        let future = now() + chrono::Duration::hours(2);
        let claimed = store.claim_next("w1", future).await.unwrap().unwrap();
        assert_eq!(claimed.id, "later");
    }

    #[tokio::test]
    async fn test_complete_records_run_and_clears_claim() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();
        store.claim_next("w1", now()).await.unwrap().unwrap();

        let job = store
            .complete("a", run_record("w1", RunOutcome::Success, Some(0)))
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.worker_name, None);
        assert_eq!(job.last_error, None);

        let runs = store.runs_for("a").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].attempt, 1);
        assert_eq!(runs[0].outcome, RunOutcome::Success);
        assert_eq!(runs[0].exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_complete_requires_processing_state() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();

        let err = store
            .complete("a", run_record("w1", RunOutcome::Success, Some(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_failure_schedules_exponential_backoff() {
        let store = memory_store().await;
        let mut flaky = spec("b", "false");
        flaky.max_retries = Some(2);
        store.enqueue(flaky).await.unwrap();
        let cfg = QueueConfig::default();

        // First failure: retry in base^0 = 1s.
        store.claim_next("w1", now()).await.unwrap().unwrap();
        let before = now();
        let job = store
            .reschedule_or_dead("b", run_record("w1", RunOutcome::Failure, Some(1)), &cfg)
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some());
        let delay = job.next_run_at - before;
        assert!((1..=2).contains(&delay.num_seconds()), "delay was {delay}");

        // Second failure: retry in base^1 = 2s.
        store.move_failed_to_pending(job.next_run_at).await.unwrap();
        store.claim_next("w1", job.next_run_at).await.unwrap().unwrap();
        let before = now();
        let job = store
            .reschedule_or_dead("b", run_record("w1", RunOutcome::Failure, Some(1)), &cfg)
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 2);
        let delay = job.next_run_at - before;
        assert!((2..=3).contains(&delay.num_seconds()), "delay was {delay}");

        // Third failure exhausts max_retries = 2: attempts 3 > 2 → dead.
        store.move_failed_to_pending(job.next_run_at).await.unwrap();
        store.claim_next("w1", job.next_run_at).await.unwrap().unwrap();
        let job = store
            .reschedule_or_dead("b", run_record("w1", RunOutcome::Failure, Some(1)), &cfg)
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 3);
        assert_eq!(store.runs_for("b").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_outcome_counts_against_budget() {
        let store = memory_store().await;
        let mut slow = spec("t", "sleep 10");
        slow.max_retries = Some(0);
        store.enqueue(slow).await.unwrap();

        store.claim_next("w1", now()).await.unwrap().unwrap();
        let job = store
            .reschedule_or_dead(
                "t",
                run_record("w1", RunOutcome::Timeout, None),
                &QueueConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.last_error.as_deref(), Some("execution timed out"));

        let runs = store.runs_for("t").await.unwrap();
        assert_eq!(runs[0].outcome, RunOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_move_failed_to_pending_is_idempotent() {
        let store = memory_store().await;
        let mut flaky = spec("b", "false");
        flaky.max_retries = Some(3);
        store.enqueue(flaky).await.unwrap();

        store.claim_next("w1", now()).await.unwrap().unwrap();
        let job = store
            .reschedule_or_dead(
                "b",
                run_record("w1", RunOutcome::Failure, Some(1)),
                &QueueConfig::default(),
            )
            .await
            .unwrap();

        // Not yet eligible: backoff has not elapsed.
        assert_eq!(store.move_failed_to_pending(now()).await.unwrap(), 0);

        let eligible_at = job.next_run_at;
        assert_eq!(store.move_failed_to_pending(eligible_at).await.unwrap(), 1);
        assert_eq!(store.get("b").await.unwrap().state, JobState::Pending);

        // Same clock, second sweep: nothing left to move.
        assert_eq!(store.move_failed_to_pending(eligible_at).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_from_dlq_resets_budget() {
        let store = memory_store().await;
        let mut doomed = spec("d", "false");
        doomed.max_retries = Some(0);
        store.enqueue(doomed).await.unwrap();
        store.claim_next("w1", now()).await.unwrap().unwrap();
        store
            .reschedule_or_dead(
                "d",
                run_record("w1", RunOutcome::Failure, Some(1)),
                &QueueConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(store.get("d").await.unwrap().state, JobState::Dead);

        let job = store.retry_from_dlq("d").await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.last_error, None);
        assert!(job.next_run_at <= now());
    }

    #[tokio::test]
    async fn test_retry_from_dlq_requires_dead_state() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();

        let err = store.retry_from_dlq("a").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_stats_are_zero_filled() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();
        store.enqueue(spec("b", "echo ok")).await.unwrap();
        store.claim_next("w1", now()).await.unwrap().unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.len(), 5);
        assert_eq!(stats[&JobState::Pending], 1);
        assert_eq!(stats[&JobState::Processing], 1);
        assert_eq!(stats[&JobState::Completed], 0);
        assert_eq!(stats[&JobState::Failed], 0);
        assert_eq!(stats[&JobState::Dead], 0);
    }

    #[tokio::test]
    async fn test_increment_attempts_requires_existing_job() {
        let store = memory_store().await;
        assert!(matches!(
            store.increment_attempts("ghost").await.unwrap_err(),
            QueueError::NotFound(_)
        ));

        store.enqueue(spec("a", "echo ok")).await.unwrap();
        store.increment_attempts("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_state() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();
        store.enqueue(spec("b", "echo ok")).await.unwrap();
        store.claim_next("w1", now()).await.unwrap().unwrap();

        let pending = store.list(Some(JobState::Pending), None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");

        let all = store.list(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let limited = store.list(None, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_requeue_orphans_is_gated_on_age() {
        let store = memory_store().await;
        store.enqueue(spec("a", "echo ok")).await.unwrap();
        store.claim_next("w1", now()).await.unwrap().unwrap();

        // Claim is fresh: nothing to recover.
        assert_eq!(store.requeue_orphans(now(), 60).await.unwrap(), 0);

        // From one hour in the future the claim looks long dead.
        let later = now() + chrono::Duration::hours(1);
        assert_eq!(store.requeue_orphans(later, 60).await.unwrap(), 1);

        let job = store.get("a").await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.worker_name, None);
        assert_eq!(job.attempts, 0);
        assert!(store.runs_for("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updated_at_never_decreases() {
        let store = memory_store().await;
        let job = store.enqueue(spec("a", "echo ok")).await.unwrap();
        let t0 = job.updated_at;

        let claimed = store.claim_next("w1", now()).await.unwrap().unwrap();
        assert!(claimed.updated_at >= t0);

        let done = store
            .complete("a", run_record("w1", RunOutcome::Success, Some(0)))
            .await
            .unwrap();
        assert!(done.updated_at >= claimed.updated_at);
    }

    #[tokio::test]
    async fn test_backoff_delay_grows_exponentially() {
        assert_eq!(backoff_delay(2.0, 1).num_seconds(), 1);
        assert_eq!(backoff_delay(2.0, 2).num_seconds(), 2);
        assert_eq!(backoff_delay(2.0, 3).num_seconds(), 4);
        assert_eq!(backoff_delay(3.0, 3).num_seconds(), 9);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::new(tmp.path());

        {
            let store = Store::open(&settings).await.unwrap();
            store.enqueue(spec("durable", "echo ok")).await.unwrap();
        }

        let reopened = Store::open(&settings).await.unwrap();
        let job = reopened.get("durable").await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.command, "echo ok");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_hand_out_a_job_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::new(tmp.path());
        let store = Store::open(&settings).await.unwrap();

        for i in 0..10 {
            store
                .enqueue(spec(&format!("job-{i}"), "echo ok"))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for w in 0..4 {
            // Each claimer gets its own pool, as separate worker processes
            // would.
            let worker_store = Store::open(&settings).await.unwrap();
            let worker = format!("w{w}");
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = worker_store.claim_next(&worker, now()).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10, "every job claimed exactly once");
    }
}
