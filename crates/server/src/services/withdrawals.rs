//! Withdrawal request workflow.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};

use parcel_ledger_core::ledger::{Posting, WalletOwner};
use parcel_ledger_core::withdrawal::{self, WithdrawalAction, WithdrawalError};
use parcel_ledger_core::{WithdrawalRequestId, WithdrawalStatus};

use super::events::DomainEvent;
use super::{Context, wallets};
use crate::error::AppError;
use crate::models::{BankDetails, NewWithdrawalRequest, WithdrawalRequest};

/// Owner-initiated, admin-adjudicated withdrawals.
#[derive(Clone)]
pub struct WithdrawalService {
    ctx: Arc<Context>,
}

impl WithdrawalService {
    pub(crate) const fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Open a withdrawal request against the owner's wallet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` unless `amount > 0`, `InsufficientBalance`
    /// when `amount` exceeds the current balance, `BadRequest` for blank bank
    /// details, and `Conflict` when the owner already has an open request and
    /// the single-open rule applies to its wallet kind.
    #[instrument(skip(self, bank), fields(owner = %owner, amount = %amount))]
    pub async fn create(
        &self,
        owner: WalletOwner,
        amount: Decimal,
        bank: BankDetails,
    ) -> Result<WithdrawalRequest, AppError> {
        if [&bank.bank_name, &bank.account_number, &bank.account_holder]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(AppError::BadRequest(
                "bank name, account number, and account holder are required".to_string(),
            ));
        }

        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let wallet = uow.lock_or_create_wallet(owner, now).await?;

        withdrawal::check_amount(amount, wallet.balances.balance)?;
        if withdrawal::blocks_second_open_request(
            owner.kind(),
            self.ctx.settings.withdrawal_store_single_open,
        ) && uow.has_open_withdrawal(owner).await?
        {
            return Err(WithdrawalError::AlreadyOpen.into());
        }

        let request = uow
            .insert_withdrawal(NewWithdrawalRequest {
                wallet_id: wallet.id,
                owner,
                amount,
                bank,
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        info!(withdrawal_id = %request.id, "Withdrawal requested");
        self.ctx
            .notifier
            .dispatch(&[DomainEvent::WithdrawalRequested {
                request_id: request.id,
                owner,
                amount,
            }])
            .await;
        Ok(request)
    }

    /// Mark a store request approved for payout.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` and `InvalidStateTransition`.
    #[instrument(skip(self, note), fields(withdrawal_id = %id))]
    pub async fn approve(
        &self,
        id: WithdrawalRequestId,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        self.decide(id, WithdrawalAction::Approve, note, None).await
    }

    /// Reject a request. No money moves.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` and `InvalidStateTransition`.
    #[instrument(skip(self, reason, note), fields(withdrawal_id = %id))]
    pub async fn reject(
        &self,
        id: WithdrawalRequestId,
        reason: String,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        self.decide(id, WithdrawalAction::Reject, note, Some(reason))
            .await
    }

    /// Pay a request out: re-check the balance, debit the wallet, and link
    /// the `WITHDRAWAL` transaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidStateTransition`, and
    /// `InsufficientBalance` when the balance no longer covers the amount.
    #[instrument(skip(self, note), fields(withdrawal_id = %id))]
    pub async fn complete(
        &self,
        id: WithdrawalRequestId,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        self.decide(id, WithdrawalAction::Complete, note, None).await
    }

    /// Withdrawal request by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when absent.
    pub async fn get(&self, id: WithdrawalRequestId) -> Result<WithdrawalRequest, AppError> {
        self.ctx
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("withdrawal request {id}")))
    }

    async fn decide(
        &self,
        id: WithdrawalRequestId,
        action: WithdrawalAction,
        note: Option<String>,
        reason: Option<String>,
    ) -> Result<WithdrawalRequest, AppError> {
        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let mut request = uow
            .lock_withdrawal(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("withdrawal request {id}")))?;

        let next = withdrawal::next_status(request.owner.kind(), request.status, action)?;

        if next == WithdrawalStatus::Completed {
            if request.transaction_id.is_some() {
                return Err(AppError::Internal(format!(
                    "withdrawal request {id} is already linked to a transaction"
                )));
            }
            let mut wallet = uow.lock_or_create_wallet(request.owner, now).await?;
            withdrawal::check_amount(request.amount, wallet.balances.balance)?;
            let transaction = wallets::post_to(
                uow.as_mut(),
                &mut wallet,
                Posting::Withdraw(request.amount),
                &format!("Withdrawal request {id}"),
                None,
                now,
            )
            .await?;
            request.transaction_id = Some(transaction.id);
        }

        request.status = next;
        if note.is_some() {
            request.admin_note = note;
        }
        if reason.is_some() {
            request.rejection_reason = reason;
        }
        if matches!(next, WithdrawalStatus::Completed | WithdrawalStatus::Rejected) {
            request.processed_at = Some(now);
        }
        request.updated_at = now;
        uow.save_withdrawal(&request).await?;
        uow.commit().await?;

        info!(status = %next, "Withdrawal request decided");
        self.ctx
            .notifier
            .dispatch(&[DomainEvent::WithdrawalDecided {
                request_id: request.id,
                owner: request.owner,
                amount: request.amount,
                status: next,
                reason: request.rejection_reason.clone(),
            }])
            .await;
        Ok(request)
    }
}
