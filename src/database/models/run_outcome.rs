use sea_orm::{sea_query::StringLen, DeriveActiveEnum};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How a single execution attempt ended.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
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
pub enum RunOutcome {
    /// The command exited with status 0.
    #[sea_orm(string_value = "success")]
    Success,

    /// The command exited non-zero or could not be run at all.
    #[sea_orm(string_value = "failure")]
    Failure,

    /// The command exceeded its wall-clock limit and was killed.
    #[sea_orm(string_value = "timeout")]
    Timeout,
}

impl RunOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
