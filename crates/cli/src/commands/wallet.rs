//! Wallet ledger checks.

use parcel_ledger_core::ledger::{WalletKind, WalletOwner};

use super::{CommandError, connect};

/// Replay a wallet's transactions and compare the result with its stored
/// balances.
///
/// # Errors
///
/// Returns `CommandError::Inconsistent` when the replay disagrees, and the
/// underlying error when the wallet cannot be loaded.
pub async fn verify(kind: WalletKind, owner_id: i64) -> Result<(), CommandError> {
    let services = connect().await?;
    let owner = WalletOwner::from_parts(kind, owner_id);

    let report = services.wallets.verify(owner).await?;
    let json = serde_json::to_string_pretty(&report).unwrap_or_default();
    tracing::info!("{json}");

    if report.consistent {
        tracing::info!(owner = %owner, transactions = report.transactions, "Ledger is consistent");
        Ok(())
    } else {
        tracing::error!(owner = %owner, error = ?report.error, "Ledger does not replay");
        Err(CommandError::Inconsistent)
    }
}
