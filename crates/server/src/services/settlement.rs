//! Return requests, dispute settlement, and payout release.
//!
//! A resolved dispute's money directive is applied exactly once: the request's
//! `settled_at` is checked and stamped under the request's row lock, in the
//! same unit of work as the postings themselves. A full refund whose goods
//! must travel back is recorded at adjudication and applied when the return
//! shipment reaches `RETURNED`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use parcel_ledger_core::ledger::{Posting, WalletOwner};
use parcel_ledger_core::settlement::{self, DisputeResolution};
use parcel_ledger_core::{
    OrderId, OrderStatus, PayoutStatus, ReturnRequestId, ReturnRequestStatus, RevenueType,
};

use super::events::{DomainEvent, RefundChannel};
use super::payment_gateway::RefundRequest;
use super::{Context, wallets};
use crate::db::UnitOfWork;
use crate::error::AppError;
use crate::models::{NewAdminRevenue, NewReturnRequest, Order, ReturnRequest};

/// Refund a pre-paid buyer through the gateway, falling back to the buyer
/// wallet when the gateway is absent, declines, or errors.
pub(crate) async fn refund_buyer(
    ctx: &Context,
    uow: &mut dyn UnitOfWork,
    order: &Order,
    amount: Decimal,
    description: &str,
    now: DateTime<Utc>,
) -> Result<RefundChannel, AppError> {
    if let (Some(gateway), Some(payment_ref)) = (&ctx.gateway, &order.payment_ref) {
        let request = RefundRequest {
            transaction_ref: payment_ref.clone(),
            amount,
            description: description.to_string(),
            idempotency_key: order.id.to_string(),
        };
        match gateway.refund(&request).await {
            Ok(outcome) if outcome.success => {
                info!(
                    order_id = %order.id,
                    refund_ref = ?outcome.refund_ref,
                    amount = %amount,
                    "Refunded through payment gateway"
                );
                return Ok(RefundChannel::Gateway);
            }
            Ok(_) => warn!(order_id = %order.id, "Gateway declined refund, crediting wallet"),
            Err(e) => warn!(
                order_id = %order.id,
                error = %e,
                "Gateway refund failed, crediting wallet"
            ),
        }
    }

    wallets::post(
        uow,
        WalletOwner::Buyer(order.buyer_id),
        Posting::Refund(amount),
        description,
        Some(order.id),
        now,
    )
    .await?;
    Ok(RefundChannel::Wallet)
}

/// Apply a resolution's money directive and stamp `settled_at`.
///
/// Does nothing when the request is already settled. The caller holds locks
/// on both `order` and `request` and saves them afterwards.
pub(crate) async fn settle(
    uow: &mut dyn UnitOfWork,
    order: &mut Order,
    request: &mut ReturnRequest,
    resolution: DisputeResolution,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> Result<(), AppError> {
    if request.is_settled() {
        debug!(return_request_id = %request.id, "Return request already settled");
        return Ok(());
    }

    let directive = settlement::directive(resolution, &order.figures())?;
    let description = format!("Return request {} for order {}", request.id, order.id);

    if let Some(amount) = directive.buyer_refund {
        wallets::post(
            uow,
            WalletOwner::Buyer(order.buyer_id),
            Posting::Refund(amount),
            &description,
            Some(order.id),
            now,
        )
        .await?;
        events.push(DomainEvent::RefundIssued {
            order_id: order.id,
            buyer_id: order.buyer_id,
            amount,
            channel: RefundChannel::Wallet,
        });
    }

    for posting in directive.store_postings {
        wallets::post(
            uow,
            WalletOwner::Store(order.store_id),
            posting,
            &description,
            Some(order.id),
            now,
        )
        .await?;
    }

    if directive.platform_share > Decimal::ZERO {
        let recorded = uow
            .insert_revenue(NewAdminRevenue {
                order_id: order.id,
                revenue_type: RevenueType::DisputeRefundShare,
                amount: -directive.platform_share,
                description,
                created_at: now,
            })
            .await?;
        if !recorded {
            warn!(
                order_id = %order.id,
                amount = %directive.platform_share,
                "Dispute refund share already recorded for order"
            );
        }
    }

    if let Some(status) = directive.payout_status {
        order.payout_status = status;
    }
    if let Some(status) = directive.payment_status {
        order.payment_status = status;
    }
    order.updated_at = now;

    request.settled_at = Some(now);
    request.updated_at = now;

    info!(
        return_request_id = %request.id,
        order_id = %order.id,
        resolution = ?resolution,
        "Return request settled"
    );
    Ok(())
}

/// Return request adjudication and payout release.
#[derive(Clone)]
pub struct SettlementService {
    ctx: Arc<Context>,
}

impl SettlementService {
    pub(crate) const fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Open a return request for a delivered order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order, `InvalidStateTransition`
    /// unless the order is `DELIVERED`, and `Conflict` when the order already
    /// has an unsettled request.
    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn open_return_request(
        &self,
        order_id: OrderId,
        reason: &str,
        requires_return: bool,
    ) -> Result<ReturnRequest, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest("reason must not be empty".to_string()));
        }

        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;

        if order.status != OrderStatus::Delivered {
            return Err(AppError::InvalidStateTransition(format!(
                "order {order_id} is {}; returns need DELIVERED",
                order.status
            )));
        }
        if let Some(open) = uow.unsettled_return_request(order_id).await? {
            return Err(AppError::Conflict(format!(
                "order {order_id} already has open return request {}",
                open.id
            )));
        }

        let request = uow
            .insert_return_request(NewReturnRequest {
                order_id,
                buyer_id: order.buyer_id,
                store_id: order.store_id,
                reason: reason.trim().to_string(),
                requires_return,
                created_at: now,
            })
            .await?;
        uow.commit().await?;

        info!(return_request_id = %request.id, requires_return, "Return request opened");
        Ok(request)
    }

    /// Adjudicate a return request.
    ///
    /// Re-sending the resolution a request already carries returns it
    /// unchanged; a different one is refused.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidStateTransition` for a conflicting
    /// resolution, `InvalidAmount` for a partial refund outside
    /// `0 < amount < product + shipping`, and `InsufficientBalance` when a
    /// released payout cannot cover the clawback.
    #[instrument(skip(self, note), fields(return_request_id = %id))]
    pub async fn resolve_return_request(
        &self,
        id: ReturnRequestId,
        resolution: DisputeResolution,
        note: Option<String>,
    ) -> Result<ReturnRequest, AppError> {
        let order_id = self
            .ctx
            .store
            .return_request(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {id}")))?
            .order_id;

        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        let mut request = uow
            .lock_return_request(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {id}")))?;

        if let Some(existing) = request.resolution {
            if existing == resolution {
                debug!("Resolution already recorded");
                return Ok(request);
            }
            return Err(AppError::InvalidStateTransition(format!(
                "return request {id} is already resolved as {existing:?}"
            )));
        }
        if request.status != ReturnRequestStatus::Requested {
            return Err(AppError::InvalidStateTransition(format!(
                "return request {id} is {}",
                request.status
            )));
        }

        request.resolution = Some(resolution);
        request.status = resolution.request_status();
        request.admin_note = note;
        request.updated_at = now;

        let mut events = vec![DomainEvent::ReturnRequestResolved {
            request_id: id,
            order_id,
            buyer_id: request.buyer_id,
            store_id: request.store_id,
            resolution,
        }];

        if resolution.is_deferred(request.requires_return) {
            info!("Full refund deferred until the goods are returned");
        } else {
            settle(
                uow.as_mut(),
                &mut order,
                &mut request,
                resolution,
                now,
                &mut events,
            )
            .await?;
            uow.save_order(&order).await?;
        }

        uow.save_return_request(&request).await?;
        uow.commit().await?;

        self.ctx.notifier.dispatch(&events).await;
        Ok(request)
    }

    /// Mature one order's pending payout into the store's balance.
    ///
    /// Returns `false` when the order no longer qualifies: payout not
    /// `PENDING`, hold period not over, or a return request still unsettled.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order, or the ledger error when the
    /// store's pending amount cannot cover the release.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release_payout(
        &self,
        order_id: OrderId,
        delivered_before: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;

        let due = order.payout_status == PayoutStatus::Pending
            && order.delivered_at.is_some_and(|at| at <= delivered_before);
        if !due {
            return Ok(false);
        }
        if let Some(open) = uow.unsettled_return_request(order_id).await? {
            debug!(return_request_id = %open.id, "Payout held for open return request");
            return Ok(false);
        }

        let amount = order.store_payout.unwrap_or_default();
        if amount > Decimal::ZERO {
            wallets::post(
                uow.as_mut(),
                WalletOwner::Store(order.store_id),
                Posting::ReleasePending(amount),
                &format!("Payout for order {order_id}"),
                Some(order_id),
                now,
            )
            .await?;
        }

        order.payout_status = PayoutStatus::Released;
        if order.status == OrderStatus::Delivered {
            order.status = OrderStatus::Completed;
        }
        order.updated_at = now;
        uow.save_order(&order).await?;
        uow.commit().await?;

        info!(amount = %amount, "Payout released");
        self.ctx
            .notifier
            .dispatch(&[DomainEvent::PayoutReleased {
                order_id,
                store_id: order.store_id,
                amount,
            }])
            .await;
        Ok(true)
    }

    /// Return request by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when absent.
    pub async fn get(&self, id: ReturnRequestId) -> Result<ReturnRequest, AppError> {
        self.ctx
            .store
            .return_request(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {id}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testing::{Harness, harness, new_order, seed_order};
    use super::*;
    use crate::db::LedgerStore;
    use crate::models::Actor;
    use crate::services::Clock;
    use parcel_ledger_core::ledger::TransactionType;
    use parcel_ledger_core::shipment::ShipmentAction;
    use parcel_ledger_core::{PaymentMethod, PaymentStatus, StoreId, UserId};
    use rust_decimal_macros::dec;

    const BUYER: WalletOwner = WalletOwner::Buyer(UserId::new(100));
    const STORE: WalletOwner = WalletOwner::Store(StoreId::new(200));

    /// A COD order for 200 + 15 shipping, delivered, with 205 pending.
    async fn delivered(h: &Harness) -> Order {
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(200), dec!(15))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        for action in [
            ShipmentAction::PickingUp,
            ShipmentAction::PickedUp,
            ShipmentAction::StartShipping,
            ShipmentAction::Deliver,
        ] {
            h.services
                .shipments
                .transition(shipment.id, action, Actor::Shipper(9))
                .await
                .unwrap();
        }
        h.store.order(order.id).await.unwrap().unwrap()
    }

    async fn refunds(h: &Harness) -> usize {
        h.services
            .wallets
            .transactions(BUYER)
            .await
            .unwrap()
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Refund)
            .count()
    }

    #[tokio::test]
    async fn test_full_refund_settles_immediately() {
        let h = harness();
        let order = delivered(&h).await;
        let request = h
            .services
            .settlement
            .open_return_request(order.id, "arrived broken", false)
            .await
            .unwrap();

        let resolved = h
            .services
            .settlement
            .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, ReturnRequestStatus::Approved);
        assert!(resolved.is_settled());

        let buyer = h.services.wallets.get_or_create(BUYER).await.unwrap();
        assert_eq!(buyer.balances.balance, dec!(215));
        assert_eq!(refunds(&h).await, 1);

        let store = h.services.wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(store.balances.pending_amount, Decimal::ZERO);
        assert_eq!(store.balances.balance, Decimal::ZERO);

        // The 10 commission never reached the store; the platform gives it back.
        let share = h
            .store
            .revenue_for_order(order.id)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.revenue_type == RevenueType::DisputeRefundShare)
            .unwrap();
        assert_eq!(share.amount, dec!(-10));

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
        assert_eq!(order.payout_status, PayoutStatus::Reversed);
    }

    #[tokio::test]
    async fn test_partial_refund_releases_remainder() {
        let h = harness();
        let order = delivered(&h).await;
        let request = h
            .services
            .settlement
            .open_return_request(order.id, "scratched", false)
            .await
            .unwrap();

        h.services
            .settlement
            .resolve_return_request(
                request.id,
                DisputeResolution::PartialRefund {
                    buyer_amount: dec!(50),
                },
                Some("keeps the item".to_string()),
            )
            .await
            .unwrap();

        let store = h.services.wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(store.balances.balance, dec!(155));
        assert_eq!(store.balances.pending_amount, Decimal::ZERO);
        let buyer = h.services.wallets.get_or_create(BUYER).await.unwrap();
        assert_eq!(buyer.balances.balance, dec!(50));

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::PartiallyRefunded);
        assert_eq!(order.payout_status, PayoutStatus::Released);
    }

    #[tokio::test]
    async fn test_partial_refund_bounds() {
        let h = harness();
        let order = delivered(&h).await;
        let request = h
            .services
            .settlement
            .open_return_request(order.id, "scratched", false)
            .await
            .unwrap();

        let err = h
            .services
            .settlement
            .resolve_return_request(
                request.id,
                DisputeResolution::PartialRefund {
                    buyer_amount: dec!(215),
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_AMOUNT");

        let request = h.services.settlement.get(request.id).await.unwrap();
        assert_eq!(request.status, ReturnRequestStatus::Requested);
        assert_eq!(request.resolution, None);
    }

    #[tokio::test]
    async fn test_deferred_refund_waits_for_goods() {
        let h = harness();
        let order = delivered(&h).await;
        let request = h
            .services
            .settlement
            .open_return_request(order.id, "not as described", true)
            .await
            .unwrap();

        let resolved = h
            .services
            .settlement
            .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
            .await
            .unwrap();
        assert!(!resolved.is_settled());
        assert_eq!(refunds(&h).await, 0);

        let leg = h
            .services
            .shipments
            .create_return_shipment(request.id, Actor::Admin(1))
            .await
            .unwrap();
        for action in [
            ShipmentAction::PickingUp,
            ShipmentAction::PickedUp,
            ShipmentAction::StartReturning,
            ShipmentAction::CompleteReturn,
        ] {
            h.services
                .shipments
                .transition(leg.id, action, Actor::Shipper(9))
                .await
                .unwrap();
        }

        let request = h.services.settlement.get(request.id).await.unwrap();
        assert_eq!(request.status, ReturnRequestStatus::Returned);
        assert!(request.is_settled());
        assert_eq!(refunds(&h).await, 1);
        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Returned);

        let again = h
            .services
            .settlement
            .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
            .await
            .unwrap();
        assert_eq!(again.settled_at, request.settled_at);
        assert_eq!(refunds(&h).await, 1);
    }

    #[tokio::test]
    async fn test_conflicting_resolution_is_refused() {
        let h = harness();
        let order = delivered(&h).await;
        let request = h
            .services
            .settlement
            .open_return_request(order.id, "late", false)
            .await
            .unwrap();
        h.services
            .settlement
            .resolve_return_request(request.id, DisputeResolution::Rejected, None)
            .await
            .unwrap();

        let err = h
            .services
            .settlement
            .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATE_TRANSITION");
        assert_eq!(refunds(&h).await, 0);
    }

    #[tokio::test]
    async fn test_return_requests_need_delivered_order() {
        let h = harness();
        let pending = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(10), dec!(1))).await;
        let err = h
            .services
            .settlement
            .open_return_request(pending.id, "changed my mind", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATE_TRANSITION");

        let order = delivered(&h).await;
        h.services
            .settlement
            .open_return_request(order.id, "first", false)
            .await
            .unwrap();
        let err = h
            .services
            .settlement
            .open_return_request(order.id, "second", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");

        let err = h
            .services
            .settlement
            .open_return_request(order.id, "  ", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_release_payout_is_idempotent() {
        let h = harness();
        let order = delivered(&h).await;
        let cutoff = h.clock.now();

        assert!(h.services.settlement.release_payout(order.id, cutoff).await.unwrap());
        assert!(!h.services.settlement.release_payout(order.id, cutoff).await.unwrap());

        let store = h.services.wallets.get_or_create(STORE).await.unwrap();
        assert_eq!(store.balances.balance, dec!(205));
        assert_eq!(store.balances.total_earned, dec!(205));

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payout_status, PayoutStatus::Released);
    }
}
