use sea_orm::{ConnectOptions, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

use crate::error::Result;
use crate::settings::Settings;

pub mod migrations;
pub mod models;

/// Open the queue database (creating the file on first use) and bring the
/// schema up to date.
pub async fn setup_database(settings: &Settings) -> Result<DatabaseConnection> {
    let db = connect(&settings.db_url()).await?;
    migrations::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Connect with a single-connection pool. SQLite allows one writer at a
/// time; a pool of one keeps each process's writes ordered and leaves
/// cross-process serialisation to the engine's file locking.
pub async fn connect(url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(url.to_owned());

    options.sqlx_logging(false); // Disable SQL query logging to reduce noise
    options.max_connections(1);

    debug!("Connecting to database at: {}", url);

    Ok(sea_orm::Database::connect(options).await?)
}
