use sea_orm::{sea_query::StringLen, DeriveActiveEnum};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Lifecycle state of a queued job.
///
/// # State Transitions
///
/// Typical lifecycle:
/// - `Pending` → `Processing` → `Completed` (success)
/// - `Pending` → `Processing` → `Failed` → `Pending` (retry after backoff)
/// - `Pending` → `Processing` → `Dead` (retry budget exhausted)
/// - `Dead` → `Pending` (explicit DLQ retry with a fresh budget)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum JobState {
    /// Waiting to be claimed. Eligible once `next_run_at` has been reached.
    /// This is the state newly enqueued jobs start in.
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,

    /// Claimed and currently being executed by a worker. A `processing` row
    /// always carries the claiming worker's name; no other worker can claim
    /// it.
    #[sea_orm(string_value = "processing")]
    Processing,

    /// Finished successfully. Terminal.
    #[sea_orm(string_value = "completed")]
    Completed,

    /// A recent attempt failed and a retry is scheduled for `next_run_at`.
    /// The supervisor's reactivation sweep hoists these back to `Pending`
    /// once the backoff has elapsed.
    #[sea_orm(string_value = "failed")]
    Failed,

    /// Retry budget exhausted; parked in the dead letter queue awaiting an
    /// operator decision. Terminal until an explicit DLQ retry.
    #[sea_orm(string_value = "dead")]
    Dead,
}

#[allow(dead_code)]
impl JobState {
    /// Terminal states are final until explicit operator action (`dlq retry`
    /// is the only way out of `Dead`).
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// Checks if this job is currently held by a worker.
    pub const fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }
}
