//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! pl-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LEDGER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! `crates/server/migrations/`

use parcel_ledger_server::config::LedgerConfig;
use parcel_ledger_server::db;

use super::CommandError;

/// Run the ledger database migrations.
///
/// # Errors
///
/// Returns an error if configuration is missing, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let config = LedgerConfig::from_env()?;

    tracing::info!("Connecting to ledger database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running ledger migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Ledger migrations complete!");
    Ok(())
}
