//! `SeaORM` Entity for execution attempt records

use crate::database::models::run_outcome::RunOutcome;
use sea_orm::entity::prelude::*;

/// Append-only record of one execution attempt. Rows are never updated or
/// deleted; a job's history is the ordered set of its runs.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "job_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: String,
    /// Ordinal of this attempt on the job. Restarts at 1 after a DLQ retry
    /// resets the job's budget.
    pub attempt: i32,
    pub started_at: DateTime,
    pub finished_at: DateTime,
    pub duration_ms: i64,
    /// Exit status of the command; absent when it was killed by a signal or
    /// never ran.
    pub exit_code: Option<i32>,
    pub stdout_bytes: i64,
    pub stderr_bytes: i64,
    pub worker_name: String,
    pub outcome: RunOutcome,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::job::Entity",
        from = "Column::JobId",
        to = "super::job::Column::Id"
    )]
    Job,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
