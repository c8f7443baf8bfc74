//! Command implementations.

pub mod jobs;
pub mod migrate;
pub mod wallet;

use std::sync::Arc;

use thiserror::Error;

use parcel_ledger_server::config::{ConfigError, LedgerConfig};
use parcel_ledger_server::db::{self, PgLedgerStore};
use parcel_ledger_server::error::AppError;
use parcel_ledger_server::services::{Dependencies, Services, Settings};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    App(#[from] AppError),

    #[error("wallet ledger is inconsistent")]
    Inconsistent,
}

/// Connect to the configured database and wire the services to it.
async fn connect() -> Result<Services, CommandError> {
    let config = LedgerConfig::from_env()?;

    tracing::info!("Connecting to ledger database...");
    let pool = db::create_pool(&config.database_url).await?;

    Ok(Services::new(
        Dependencies::from_config(&config, Arc::new(PgLedgerStore::new(pool))),
        Settings::from(&config),
    ))
}
