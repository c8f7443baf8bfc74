//! Wallets and their transaction log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parcel_ledger_core::ledger::{LedgerEntry, LedgerLine, TransactionType, WalletBalances, WalletOwner};
use parcel_ledger_core::{OrderId, TransactionId, WalletId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: WalletOwner,
    #[serde(flatten)]
    pub balances: WalletBalances,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub transaction_type: TransactionType,
    /// Signed change to the balance.
    pub amount: Decimal,
    /// Signed change to the pending amount.
    pub pending_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[must_use]
    pub const fn line(&self) -> LedgerLine {
        LedgerLine {
            amount: self.amount,
            pending_delta: self.pending_delta,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub pending_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    /// Row for a posting that was just applied to `wallet_id`.
    #[must_use]
    pub fn from_entry(
        wallet_id: WalletId,
        entry: &LedgerEntry,
        description: impl Into<String>,
        order_id: Option<OrderId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_id,
            transaction_type: entry.transaction_type,
            amount: entry.amount,
            pending_delta: entry.pending_delta,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            description: description.into(),
            order_id,
            created_at,
        }
    }
}
