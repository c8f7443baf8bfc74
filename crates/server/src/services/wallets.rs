//! Store and buyer wallet operations.
//!
//! Every balance change goes through [`post`], which applies the posting,
//! saves the wallet, and appends its transaction in the caller's unit of
//! work. The public methods on [`WalletService`] each open their own unit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use parcel_ledger_core::OrderId;
use parcel_ledger_core::ledger::{self, Posting, TransactionType, WalletOwner};

use super::Context;
use crate::db::{LedgerStore, UnitOfWork};
use crate::error::AppError;
use crate::models::{NewTransaction, Transaction, Wallet};

/// Apply one posting to the owner's wallet inside `uow`.
///
/// The wallet is created on first use.
///
/// # Errors
///
/// Returns the ledger error when the posting is refused, or a persistence
/// error.
pub(crate) async fn post(
    uow: &mut dyn UnitOfWork,
    owner: WalletOwner,
    posting: Posting,
    description: &str,
    order_id: Option<OrderId>,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let mut wallet = uow.lock_or_create_wallet(owner, now).await?;
    post_to(uow, &mut wallet, posting, description, order_id, now).await
}

/// Apply one posting to a wallet already locked in `uow`.
pub(crate) async fn post_to(
    uow: &mut dyn UnitOfWork,
    wallet: &mut Wallet,
    posting: Posting,
    description: &str,
    order_id: Option<OrderId>,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let entry = ledger::apply(&wallet.balances, posting)?;

    if entry.balances.pending_amount < Decimal::ZERO {
        warn!(
            wallet_id = %wallet.id,
            owner = %wallet.owner,
            pending_amount = %entry.balances.pending_amount,
            "Pending amount went negative after clawback"
        );
    }

    wallet.balances = entry.balances;
    wallet.updated_at = now;
    uow.save_wallet(wallet).await?;

    let transaction = uow
        .insert_transaction(NewTransaction::from_entry(
            wallet.id,
            &entry,
            description,
            order_id,
            now,
        ))
        .await?;

    info!(
        wallet_id = %wallet.id,
        transaction_id = %transaction.id,
        transaction_type = %transaction.transaction_type,
        amount = %transaction.amount,
        pending_delta = %transaction.pending_delta,
        "Posted wallet transaction"
    );

    Ok(transaction)
}

/// Result of replaying a wallet's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerVerification {
    pub owner: WalletOwner,
    pub balance: Decimal,
    pub pending_amount: Decimal,
    pub replayed_balance: Option<Decimal>,
    pub replayed_pending_amount: Option<Decimal>,
    pub transactions: usize,
    /// Replay reconstructs both the balance and the pending amount.
    pub consistent: bool,
    /// Why the replay broke off, if it did.
    pub error: Option<String>,
}

/// Wallet operations for stores and buyers.
#[derive(Clone)]
pub struct WalletService {
    ctx: Arc<Context>,
}

impl WalletService {
    pub(crate) const fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub(crate) fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.ctx.store
    }

    /// Return the owner's wallet, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn get_or_create(&self, owner: WalletOwner) -> Result<Wallet, AppError> {
        if let Some(wallet) = self.ctx.store.wallet(owner).await? {
            return Ok(wallet);
        }

        let mut uow = self.ctx.store.begin().await?;
        let wallet = uow.lock_or_create_wallet(owner, self.ctx.now()).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    /// Credit the balance as `EARNING` or `REFUND`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount > 0`, `BadRequest` for any
    /// other transaction type.
    #[instrument(skip(self, description), fields(owner = %owner, amount = %amount))]
    pub async fn credit(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        kind: TransactionType,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        let posting = Posting::credit(kind, amount)?;
        self.post_alone(owner, posting, description, order_id).await
    }

    /// Debit the balance as `WITHDRAWAL` or `PAYMENT`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` when `amount > balance`.
    #[instrument(skip(self, description), fields(owner = %owner, amount = %amount))]
    pub async fn debit(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        kind: TransactionType,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        let posting = Posting::debit(kind, amount)?;
        self.post_alone(owner, posting, description, order_id).await
    }

    /// Admin adjustment by a signed, non-zero delta.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a zero delta and `InsufficientBalance`
    /// when the balance would go negative.
    #[instrument(skip(self, description), fields(owner = %owner, delta = %delta))]
    pub async fn adjust(
        &self,
        owner: WalletOwner,
        delta: Decimal,
        description: &str,
    ) -> Result<Transaction, AppError> {
        self.post_alone(owner, Posting::Adjust(delta), description, None)
            .await
    }

    /// Stage money in the pending amount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount > 0`.
    pub async fn add_to_pending(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        self.post_alone(owner, Posting::AddPending(amount), description, order_id)
            .await
    }

    /// Mature pending money into the balance in one posting.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount > 0`, and the ledger's
    /// `InsufficientPending` (kind `INSUFFICIENT_BALANCE`) when more is
    /// requested than is pending.
    pub async fn transfer_pending_to_balance(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        self.post_alone(owner, Posting::ReleasePending(amount), description, order_id)
            .await
    }

    /// Claw back pending money. May leave the pending amount negative.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount > 0`.
    pub async fn deduct_from_pending(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        self.post_alone(owner, Posting::DeductPending(amount), description, order_id)
            .await
    }

    /// The owner's transactions in insertion order. Empty for an unknown owner.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn transactions(&self, owner: WalletOwner) -> Result<Vec<Transaction>, AppError> {
        match self.ctx.store.wallet(owner).await? {
            Some(wallet) => Ok(self.ctx.store.transactions(wallet.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Replay the owner's transactions against the stored balances.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the owner has no wallet.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn verify(&self, owner: WalletOwner) -> Result<LedgerVerification, AppError> {
        let wallet = self
            .ctx
            .store
            .wallet(owner)
            .await?
            .ok_or_else(|| AppError::not_found(format!("wallet {owner}")))?;
        let transactions = self.ctx.store.transactions(wallet.id).await?;
        let count = transactions.len();

        let verification = match ledger::replay(transactions.iter().map(Transaction::line)) {
            Ok(replayed) => LedgerVerification {
                owner,
                balance: wallet.balances.balance,
                pending_amount: wallet.balances.pending_amount,
                replayed_balance: Some(replayed.balance),
                replayed_pending_amount: Some(replayed.pending_amount),
                transactions: count,
                consistent: replayed.balance == wallet.balances.balance
                    && replayed.pending_amount == wallet.balances.pending_amount,
                error: None,
            },
            Err(e) => LedgerVerification {
                owner,
                balance: wallet.balances.balance,
                pending_amount: wallet.balances.pending_amount,
                replayed_balance: None,
                replayed_pending_amount: None,
                transactions: count,
                consistent: false,
                error: Some(e.to_string()),
            },
        };

        if !verification.consistent {
            warn!(
                wallet_id = %wallet.id,
                error = ?verification.error,
                "Wallet ledger does not reconstruct its balances"
            );
        }
        Ok(verification)
    }

    async fn post_alone(
        &self,
        owner: WalletOwner,
        posting: Posting,
        description: &str,
        order_id: Option<OrderId>,
    ) -> Result<Transaction, AppError> {
        let mut uow = self.ctx.store.begin().await?;
        let transaction = post(
            uow.as_mut(),
            owner,
            posting,
            description,
            order_id,
            self.ctx.now(),
        )
        .await?;
        uow.commit().await?;
        Ok(transaction)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testing::harness;
    use super::*;
    use parcel_ledger_core::{StoreId, UserId};
    use rust_decimal_macros::dec;

    const STORE: WalletOwner = WalletOwner::Store(StoreId::new(1));
    const BUYER: WalletOwner = WalletOwner::Buyer(UserId::new(2));

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let h = harness();
        let first = h.services.wallets.get_or_create(STORE).await.unwrap();
        let second = h.services.wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.balances.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_concurrent_first_creation_yields_one_wallet() {
        let h = harness();
        let a = h.services.wallets.clone();
        let b = h.services.wallets.clone();
        let (x, y) = tokio::join!(a.get_or_create(BUYER), b.get_or_create(BUYER));
        assert_eq!(x.unwrap().id, y.unwrap().id);
    }

    #[tokio::test]
    async fn test_credit_records_before_and_after() {
        let h = harness();
        let wallets = &h.services.wallets;
        wallets
            .credit(STORE, dec!(50), TransactionType::Earning, "sale", None)
            .await
            .unwrap();
        let tx = wallets
            .credit(STORE, dec!(25), TransactionType::Refund, "refund", None)
            .await
            .unwrap();
        assert_eq!(tx.balance_before, dec!(50));
        assert_eq!(tx.balance_after, dec!(75));

        let wallet = wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(wallet.balances.total_earned, dec!(50));
        assert_eq!(wallet.balances.total_refunded, dec!(25));
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amount() {
        let h = harness();
        let err = h
            .services
            .wallets
            .credit(BUYER, Decimal::ZERO, TransactionType::Refund, "x", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_AMOUNT");
        assert!(h.services.wallets.transactions(BUYER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_leaves_wallet_untouched() {
        let h = harness();
        let wallets = &h.services.wallets;
        wallets
            .credit(BUYER, dec!(10), TransactionType::Refund, "refund", None)
            .await
            .unwrap();
        let err = wallets
            .debit(BUYER, dec!(10.01), TransactionType::Payment, "order", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_BALANCE");
        assert_eq!(wallets.transactions(BUYER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_may_not_overdraw() {
        let h = harness();
        let wallets = &h.services.wallets;
        wallets.adjust(STORE, dec!(5), "goodwill").await.unwrap();
        let err = wallets.adjust(STORE, dec!(-6), "clawback").await.unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_BALANCE");
        let tx = wallets.adjust(STORE, dec!(-5), "clawback").await.unwrap();
        assert_eq!(tx.balance_after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_pending_transfer_moves_both_fields() {
        let h = harness();
        let wallets = &h.services.wallets;
        wallets
            .add_to_pending(STORE, dec!(90), "cod", None)
            .await
            .unwrap();
        wallets
            .transfer_pending_to_balance(STORE, dec!(60), "release", None)
            .await
            .unwrap();

        let wallet = wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(wallet.balances.pending_amount, dec!(30));
        assert_eq!(wallet.balances.balance, dec!(60));
        assert_eq!(wallet.balances.total_earned, dec!(60));

        let err = wallets
            .transfer_pending_to_balance(STORE, dec!(31), "release", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_BALANCE");
    }

    #[tokio::test]
    async fn test_verify_replays_every_posting() {
        let h = harness();
        let wallets = &h.services.wallets;
        wallets.add_to_pending(STORE, dec!(100), "cod", None).await.unwrap();
        wallets
            .transfer_pending_to_balance(STORE, dec!(40), "release", None)
            .await
            .unwrap();
        wallets
            .deduct_from_pending(STORE, dec!(80), "dispute", None)
            .await
            .unwrap();
        wallets.adjust(STORE, dec!(-15), "fee").await.unwrap();

        let report = wallets.verify(STORE).await.unwrap();
        assert!(report.consistent);
        assert_eq!(report.transactions, 4);
        assert_eq!(report.replayed_balance, Some(dec!(25)));
        assert_eq!(report.replayed_pending_amount, Some(dec!(-20)));
    }

    #[tokio::test]
    async fn test_verify_unknown_wallet_is_not_found() {
        let h = harness();
        let err = h.services.wallets.verify(BUYER).await.unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }
}
