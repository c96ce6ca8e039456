use std::collections::BTreeMap;
use std::time::Duration;

use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait,
    SqlErr,
};

use crate::database::models::config_entry;
use crate::error::{QueueError, Result};

pub const MAX_RETRIES: &str = "max_retries";
pub const BACKOFF_BASE: &str = "backoff_base";
pub const POLL_INTERVAL_MS: &str = "poll_interval_ms";
pub const DEFAULT_TIMEOUT_SECS: &str = "default_timeout_secs";
pub const ORPHAN_TIMEOUT_SECS: &str = "orphan_timeout_secs";

const DEFAULTS: &[(&str, &str)] = &[
    (MAX_RETRIES, "3"),
    (BACKOFF_BASE, "2"),
    (POLL_INTERVAL_MS, "500"),
    (DEFAULT_TIMEOUT_SECS, "60"),
    (ORPHAN_TIMEOUT_SECS, "0"),
];

/// Typed view over the `config` table.
///
/// Recognised keys get their default materialised into the store on first
/// read. Unknown keys are stored verbatim and ignored by the core, so newer
/// tooling can park settings here without breaking older binaries.
#[derive(Clone)]
pub struct ConfigStore {
    db: DatabaseConnection,
}

impl ConfigStore {
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Look up one key. Recognised keys never return `None`: their default
    /// is written to the store on first read and returned.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = config_entry::Entity::find_by_id(key).one(&self.db).await? {
            return Ok(Some(entry.value));
        }

        let Some(default) = default_for(key) else {
            return Ok(None);
        };

        let model = config_entry::ActiveModel {
            key: Set(key.to_owned()),
            value: Set(default.to_owned()),
        };
        match model.insert(&self.db).await {
            Ok(_) => {}
            // Another process materialised the key first; its value wins.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {}
            Err(e) => return Err(e.into()),
        }

        let value = config_entry::Entity::find_by_id(key)
            .one(&self.db)
            .await?
            .map_or_else(|| default.to_owned(), |entry| entry.value);
        Ok(Some(value))
    }

    /// Write one key, validating the value when the key is recognised.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;

        let model = config_entry::ActiveModel {
            key: Set(key.to_owned()),
            value: Set(value.to_owned()),
        };
        config_entry::Entity::insert(model)
            .on_conflict(
                OnConflict::column(config_entry::Column::Key)
                    .update_column(config_entry::Column::Value)
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Every stored key/value pair, with the recognised defaults
    /// materialised first so the listing is always complete.
    pub async fn all(&self) -> Result<BTreeMap<String, String>> {
        for (key, _) in DEFAULTS {
            self.get(key).await?;
        }
        let entries = config_entry::Entity::find().all(&self.db).await?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    /// Typed snapshot of the recognised keys.
    pub async fn load(&self) -> Result<QueueConfig> {
        Ok(QueueConfig {
            max_retries: self.numeric(MAX_RETRIES).await?,
            backoff_base: self.numeric(BACKOFF_BASE).await?,
            poll_interval: Duration::from_millis(self.numeric(POLL_INTERVAL_MS).await?),
            default_timeout: Duration::from_secs(self.numeric(DEFAULT_TIMEOUT_SECS).await?),
            orphan_timeout_secs: self.numeric(ORPHAN_TIMEOUT_SECS).await?,
        })
    }

    async fn numeric<T: std::str::FromStr>(&self, key: &str) -> Result<T> {
        let raw = self
            .get(key)
            .await?
            .unwrap_or_default();
        raw.parse().map_err(|_| {
            QueueError::InvalidInput(format!("config key '{key}' holds non-numeric value '{raw}'"))
        })
    }
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(known, _)| *known == key)
        .map(|(_, default)| *default)
}

fn validate(key: &str, value: &str) -> Result<()> {
    let invalid = |expected: &str| {
        Err(QueueError::InvalidInput(format!(
            "config key '{key}' expects {expected}, got '{value}'"
        )))
    };

    match key {
        MAX_RETRIES | ORPHAN_TIMEOUT_SECS => match value.parse::<i64>() {
            Ok(n) if n >= 0 => Ok(()),
            _ => invalid("a non-negative integer"),
        },
        POLL_INTERVAL_MS | DEFAULT_TIMEOUT_SECS => match value.parse::<i64>() {
            Ok(n) if n > 0 => Ok(()),
            _ => invalid("a positive integer"),
        },
        BACKOFF_BASE => match value.parse::<f64>() {
            Ok(n) if n > 1.0 => Ok(()),
            _ => invalid("a number greater than 1"),
        },
        // Unknown keys are accepted for forward compatibility.
        _ => Ok(()),
    }
}

/// Resolved queue tunables consumed by workers and the supervisor.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Default retry ceiling for jobs that do not carry their own.
    pub max_retries: i32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
    /// Worker sleep between empty claim attempts.
    pub poll_interval: Duration,
    /// Wall-clock limit for jobs without their own `timeout_secs`.
    pub default_timeout: Duration,
    /// Age after which a `processing` row is presumed orphaned; 0 disables
    /// the supervisor's recovery sweep.
    pub orphan_timeout_secs: u64,
}

impl QueueConfig {
    pub fn orphan_timeout(&self) -> Option<Duration> {
        (self.orphan_timeout_secs > 0).then(|| Duration::from_secs(self.orphan_timeout_secs))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            poll_interval: Duration::from_millis(500),
            default_timeout: Duration::from_secs(60),
            orphan_timeout_secs: 0,
        }
    }
}
