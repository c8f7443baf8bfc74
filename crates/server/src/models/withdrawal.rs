//! Withdrawal requests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parcel_ledger_core::ledger::WalletOwner;
use parcel_ledger_core::{TransactionId, WalletId, WithdrawalRequestId, WithdrawalStatus};

/// Where a withdrawal is paid to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalRequestId,
    pub wallet_id: WalletId,
    pub owner: WalletOwner,
    /// Frozen at creation.
    pub amount: Decimal,
    pub bank: BankDetails,
    pub status: WithdrawalStatus,
    pub admin_note: Option<String>,
    pub rejection_reason: Option<String>,
    /// The `WITHDRAWAL` transaction that paid this request. Set once.
    pub transaction_id: Option<TransactionId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawalRequest {
    pub wallet_id: WalletId,
    pub owner: WalletOwner,
    pub amount: Decimal,
    pub bank: BankDetails,
    pub created_at: DateTime<Utc>,
}
