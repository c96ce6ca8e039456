use sea_orm_migration::{
    prelude::*,
    schema::{big_integer, integer, integer_null, pk_auto, string, string_null, timestamp, timestamp_null},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The jobs table; states are plain strings (SQLite has no enum type)
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(string(Jobs::Id).primary_key())
                    .col(string(Jobs::Command))
                    .col(string(Jobs::State).default("pending"))
                    .col(integer(Jobs::Attempts).default(0))
                    .col(integer(Jobs::MaxRetries))
                    .col(integer(Jobs::Priority).default(100))
                    .col(integer_null(Jobs::TimeoutSecs))
                    .col(timestamp_null(Jobs::RunAt))
                    .col(timestamp(Jobs::NextRunAt))
                    .col(string_null(Jobs::WorkerName))
                    .col(timestamp(Jobs::CreatedAt))
                    .col(timestamp(Jobs::UpdatedAt))
                    .col(string_null(Jobs::LastError))
                    .to_owned(),
            )
            .await?;

        // Claim ordering scans on (state, priority, created_at)
        manager
            .create_index(
                Index::create()
                    .name("idx-jobs-state-priority-created_at")
                    .table(Jobs::Table)
                    .col(Jobs::State)
                    .col(Jobs::Priority)
                    .col(Jobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobRuns::Table)
                    .if_not_exists()
                    .col(pk_auto(JobRuns::Id))
                    .col(string(JobRuns::JobId))
                    .col(integer(JobRuns::Attempt))
                    .col(timestamp(JobRuns::StartedAt))
                    .col(timestamp(JobRuns::FinishedAt))
                    .col(big_integer(JobRuns::DurationMs))
                    .col(integer_null(JobRuns::ExitCode))
                    .col(big_integer(JobRuns::StdoutBytes))
                    .col(big_integer(JobRuns::StderrBytes))
                    .col(string(JobRuns::WorkerName))
                    .col(string(JobRuns::Outcome))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-job_runs-job_id")
                            .from(JobRuns::Table, JobRuns::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_runs-job_id")
                    .table(JobRuns::Table)
                    .col(JobRuns::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Config::Table)
                    .if_not_exists()
                    .col(string(Config::Key).primary_key())
                    .col(string(Config::Value))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Config::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobRuns::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    Command,
    State,
    Attempts,
    MaxRetries,
    Priority,
    TimeoutSecs,
    RunAt,
    NextRunAt,
    WorkerName,
    CreatedAt,
    UpdatedAt,
    LastError,
}

#[derive(DeriveIden)]
enum JobRuns {
    Table,
    Id,
    JobId,
    Attempt,
    StartedAt,
    FinishedAt,
    DurationMs,
    ExitCode,
    StdoutBytes,
    StderrBytes,
    WorkerName,
    Outcome,
}

#[derive(DeriveIden)]
enum Config {
    Table,
    Key,
    Value,
}
