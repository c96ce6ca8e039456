//! `SeaORM` Entity for queued jobs

use std::time::Duration;

use crate::database::models::job_state::JobState;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    /// Caller-supplied identifier; immutable once written.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Shell command line executed by a worker.
    pub command: String,
    pub state: JobState,
    /// Count of execution attempts that have finished, success or failure.
    pub attempts: i32,
    /// A failed attempt that would push `attempts` past this ceiling moves
    /// the job to the dead letter queue.
    pub max_retries: i32,
    /// Smaller dispatches first.
    pub priority: i32,
    /// Per-job wall-clock limit; the configured default applies when absent.
    pub timeout_secs: Option<i32>,
    /// Earliest start time requested at enqueue, if any.
    pub run_at: Option<DateTime>,
    /// Earliest time the job is eligible for a claim.
    pub next_run_at: DateTime,
    /// Name of the worker holding the job while `state` is `processing`.
    pub worker_name: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub last_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_run::Entity")]
    JobRun,
}

impl Related<super::job_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Wall-clock limit for one attempt, falling back to the configured
    /// default when the job does not carry its own.
    #[must_use]
    pub fn timeout(&self, default_timeout: Duration) -> Duration {
        self.timeout_secs
            .and_then(|secs| u64::try_from(secs).ok())
            .map_or(default_timeout, Duration::from_secs)
    }
}
