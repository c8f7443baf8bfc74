//! Withdrawal request workflow.
//!
//! Store requests may pass through an optional `APPROVED` step before
//! payout; buyer requests go straight from `PENDING` to a decision.
//! `REJECTED` and `COMPLETED` are terminal and never re-opened.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{LedgerError, WalletKind};
use crate::types::WithdrawalStatus;

/// Admin decision on a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalAction {
    Approve,
    Reject,
    Complete,
}

impl std::fmt::Display for WithdrawalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Errors in the withdrawal workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawalError {
    #[error("cannot {action} a {kind} withdrawal in status {from}")]
    InvalidStateTransition {
        kind: WalletKind,
        from: WithdrawalStatus,
        action: WithdrawalAction,
    },

    /// The owner already has a request awaiting a decision.
    #[error("an open withdrawal request already exists")]
    AlreadyOpen,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Status a decision moves a request to.
///
/// # Errors
///
/// Returns `WithdrawalError::InvalidStateTransition` when the action is not
/// allowed from `current` for this wallet kind.
pub fn next_status(
    kind: WalletKind,
    current: WithdrawalStatus,
    action: WithdrawalAction,
) -> Result<WithdrawalStatus, WithdrawalError> {
    use WithdrawalStatus as S;

    let next = match (kind, current, action) {
        (WalletKind::Store, S::Pending, WithdrawalAction::Approve) => Some(S::Approved),
        (WalletKind::Store, S::Pending | S::Approved, WithdrawalAction::Complete)
        | (WalletKind::Buyer, S::Pending, WithdrawalAction::Complete) => Some(S::Completed),
        (WalletKind::Store, S::Pending | S::Approved, WithdrawalAction::Reject)
        | (WalletKind::Buyer, S::Pending, WithdrawalAction::Reject) => Some(S::Rejected),
        _ => None,
    };

    next.ok_or(WithdrawalError::InvalidStateTransition {
        kind,
        from: current,
        action,
    })
}

/// Check a requested amount against the wallet's current balance.
///
/// Runs at creation and again at completion, since the balance may have
/// moved in between.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount` for a non-positive amount and
/// `LedgerError::InsufficientBalance` when it exceeds `balance`.
pub fn check_amount(amount: Decimal, balance: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if amount > balance {
        return Err(LedgerError::InsufficientBalance {
            available: balance,
            requested: amount,
        });
    }
    Ok(())
}

/// Whether a new request must be refused because one is already open.
#[must_use]
pub const fn blocks_second_open_request(kind: WalletKind, store_single_open: bool) -> bool {
    match kind {
        WalletKind::Buyer => true,
        WalletKind::Store => store_single_open,
    }
}
