//! Wallet ledger arithmetic.
//!
//! A wallet's balances are never edited directly. Every change is a
//! [`Posting`] applied to the current [`WalletBalances`], which yields a
//! [`LedgerEntry`]: the transaction row to append and the balances to save.
//! Because each entry records `balance_before` and `balance_after`, folding a
//! wallet's entries in insertion order reconstructs its balances exactly
//! (see [`replay`]).
//!
//! Store and buyer wallets share this arithmetic; only the owner differs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{StoreId, UserId};

// =============================================================================
// Owners
// =============================================================================

/// Which side of the marketplace owns a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "wallet_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Store,
    Buyer,
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Buyer => write!(f, "buyer"),
        }
    }
}

impl std::str::FromStr for WalletKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "store" => Ok(Self::Store),
            "buyer" | "user" => Ok(Self::Buyer),
            _ => Err(format!("invalid wallet kind: {s}")),
        }
    }
}

/// The owner of a wallet. Each owner has at most one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum WalletOwner {
    Store(StoreId),
    Buyer(UserId),
}

impl WalletOwner {
    /// Build an owner from its persisted `(kind, owner_id)` pair.
    #[must_use]
    pub const fn from_parts(kind: WalletKind, owner_id: i64) -> Self {
        match kind {
            WalletKind::Store => Self::Store(StoreId::new(owner_id)),
            WalletKind::Buyer => Self::Buyer(UserId::new(owner_id)),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> WalletKind {
        match self {
            Self::Store(_) => WalletKind::Store,
            Self::Buyer(_) => WalletKind::Buyer,
        }
    }

    /// Raw owner id, unique within [`Self::kind`].
    #[must_use]
    pub const fn owner_id(&self) -> i64 {
        match self {
            Self::Store(id) => id.as_i64(),
            Self::Buyer(id) => id.as_i64(),
        }
    }
}

impl std::fmt::Display for WalletOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.owner_id())
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "transaction_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money earned straight into the balance.
    Earning,
    /// Money staged in pending.
    Pending,
    /// Pending matured into balance.
    PendingRelease,
    /// Pending taken back (refund or cancellation).
    PendingReversal,
    /// Refund credited to the balance.
    Refund,
    /// Balance spent on a purchase.
    Payment,
    /// Balance paid out to a bank account.
    Withdrawal,
    /// Admin correction or clawback.
    Adjustment,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Earning => "EARNING",
            Self::Pending => "PENDING",
            Self::PendingRelease => "PENDING_RELEASE",
            Self::PendingReversal => "PENDING_REVERSAL",
            Self::Refund => "REFUND",
            Self::Payment => "PAYMENT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Adjustment => "ADJUSTMENT",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Balances
// =============================================================================

/// Running balances of one wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalances {
    /// Withdrawable money. Never negative.
    pub balance: Decimal,
    /// Collected but not yet matured. A clawback may push this below zero.
    pub pending_amount: Decimal,
    pub total_earned: Decimal,
    pub total_refunded: Decimal,
    pub total_withdrawn: Decimal,
    pub total_spent: Decimal,
}

/// A change to a wallet's balances.
///
/// Amounts are positive magnitudes except for [`Posting::Adjust`], whose
/// delta is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posting {
    /// `balance += x`, `total_earned += x`.
    Earn(Decimal),
    /// `balance += x`, `total_refunded += x`.
    Refund(Decimal),
    /// `balance -= x`, `total_withdrawn += x`.
    Withdraw(Decimal),
    /// `balance -= x`, `total_spent += x`.
    Pay(Decimal),
    /// `balance += delta` (either sign, never zero).
    Adjust(Decimal),
    /// `pending += x`.
    AddPending(Decimal),
    /// `pending -= x`, `balance += x`, `total_earned += x`.
    ReleasePending(Decimal),
    /// `pending -= x`.
    DeductPending(Decimal),
}

impl Posting {
    /// A balance credit of the given transaction type.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnsupportedType` unless `kind` is `EARNING` or
    /// `REFUND`.
    pub const fn credit(kind: TransactionType, amount: Decimal) -> Result<Self, LedgerError> {
        match kind {
            TransactionType::Earning => Ok(Self::Earn(amount)),
            TransactionType::Refund => Ok(Self::Refund(amount)),
            _ => Err(LedgerError::UnsupportedType(kind)),
        }
    }

    /// A balance debit of the given transaction type.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnsupportedType` unless `kind` is `WITHDRAWAL`
    /// or `PAYMENT`.
    pub const fn debit(kind: TransactionType, amount: Decimal) -> Result<Self, LedgerError> {
        match kind {
            TransactionType::Withdrawal => Ok(Self::Withdraw(amount)),
            TransactionType::Payment => Ok(Self::Pay(amount)),
            _ => Err(LedgerError::UnsupportedType(kind)),
        }
    }

    /// Transaction type recorded for this posting.
    #[must_use]
    pub const fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Earn(_) => TransactionType::Earning,
            Self::Refund(_) => TransactionType::Refund,
            Self::Withdraw(_) => TransactionType::Withdrawal,
            Self::Pay(_) => TransactionType::Payment,
            Self::Adjust(_) => TransactionType::Adjustment,
            Self::AddPending(_) => TransactionType::Pending,
            Self::ReleasePending(_) => TransactionType::PendingRelease,
            Self::DeductPending(_) => TransactionType::PendingReversal,
        }
    }
}

/// Errors from applying a posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Amount is zero or negative (or a zero adjustment).
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// The posting would take the balance below zero.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// More pending was requested for release than is staged.
    #[error("insufficient pending amount: available {available}, requested {requested}")]
    InsufficientPending {
        available: Decimal,
        requested: Decimal,
    },

    /// The transaction type cannot be used for this operation.
    #[error("transaction type {0} is not valid here")]
    UnsupportedType(TransactionType),
}

/// Result of applying a posting: what to append and what to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction_type: TransactionType,
    /// Signed change to `balance`.
    pub amount: Decimal,
    /// Signed change to `pending_amount`.
    pub pending_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    /// Wallet balances after the posting.
    pub balances: WalletBalances,
}

fn positive(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

fn covered(current: &WalletBalances, amount: Decimal) -> Result<(), LedgerError> {
    if amount > current.balance {
        return Err(LedgerError::InsufficientBalance {
            available: current.balance,
            requested: amount,
        });
    }
    Ok(())
}

/// Apply a posting to a wallet's balances.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount` for non-positive amounts (or a zero
/// adjustment), `LedgerError::InsufficientBalance` when the balance would go
/// negative, and `LedgerError::InsufficientPending` when releasing more than
/// is pending.
pub fn apply(current: &WalletBalances, posting: Posting) -> Result<LedgerEntry, LedgerError> {
    let mut next = *current;
    let (amount, pending_delta) = match posting {
        Posting::Earn(x) => {
            let x = positive(x)?;
            next.total_earned += x;
            (x, Decimal::ZERO)
        }
        Posting::Refund(x) => {
            let x = positive(x)?;
            next.total_refunded += x;
            (x, Decimal::ZERO)
        }
        Posting::Withdraw(x) => {
            let x = positive(x)?;
            covered(current, x)?;
            next.total_withdrawn += x;
            (-x, Decimal::ZERO)
        }
        Posting::Pay(x) => {
            let x = positive(x)?;
            covered(current, x)?;
            next.total_spent += x;
            (-x, Decimal::ZERO)
        }
        Posting::Adjust(delta) => {
            if delta.is_zero() {
                return Err(LedgerError::InvalidAmount(delta));
            }
            if delta.is_sign_negative() {
                covered(current, -delta)?;
            }
            (delta, Decimal::ZERO)
        }
        Posting::AddPending(x) => (Decimal::ZERO, positive(x)?),
        Posting::ReleasePending(x) => {
            let x = positive(x)?;
            if x > current.pending_amount {
                return Err(LedgerError::InsufficientPending {
                    available: current.pending_amount,
                    requested: x,
                });
            }
            next.total_earned += x;
            (x, -x)
        }
        Posting::DeductPending(x) => (Decimal::ZERO, -positive(x)?),
    };

    next.balance += amount;
    next.pending_amount += pending_delta;

    Ok(LedgerEntry {
        transaction_type: posting.transaction_type(),
        amount,
        pending_delta,
        balance_before: current.balance,
        balance_after: next.balance,
        balances: next,
    })
}

// =============================================================================
// Replay
// =============================================================================

/// The parts of a persisted transaction that replay needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLine {
    pub amount: Decimal,
    pub pending_delta: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

/// Balances reconstructed from a wallet's transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Replayed {
    pub balance: Decimal,
    pub pending_amount: Decimal,
    pub transactions: usize,
}

/// A transaction log that does not fold cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// `balance_before` does not continue from the previous row.
    #[error("transaction #{index}: balance_before {found} does not follow running balance {expected}")]
    Gap {
        index: usize,
        expected: Decimal,
        found: Decimal,
    },
    /// `balance_before + amount != balance_after`.
    #[error("transaction #{index}: {before} + {amount} != {after}")]
    Arithmetic {
        index: usize,
        before: Decimal,
        amount: Decimal,
        after: Decimal,
    },
}

/// Fold a wallet's transactions, in insertion order, from a zero wallet.
///
/// # Errors
///
/// Returns the first row that breaks the chain.
pub fn replay<I>(lines: I) -> Result<Replayed, ReplayError>
where
    I: IntoIterator<Item = LedgerLine>,
{
    let mut out = Replayed::default();
    for (index, line) in lines.into_iter().enumerate() {
        if line.balance_before != out.balance {
            return Err(ReplayError::Gap {
                index,
                expected: out.balance,
                found: line.balance_before,
            });
        }
        if line.balance_before + line.amount != line.balance_after {
            return Err(ReplayError::Arithmetic {
                index,
                before: line.balance_before,
                amount: line.amount,
                after: line.balance_after,
            });
        }
        out.balance = line.balance_after;
        out.pending_amount += line.pending_delta;
        out.transactions += 1;
    }
    Ok(out)
}
