//! Shipment creation and guarded transitions.
//!
//! A transition locks the shipment and its order, checks the guard against
//! the locked row, then writes status, history, order sync, and every money
//! side effect in one unit of work. Notifications go out after commit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use parcel_ledger_core::ledger::{Posting, WalletOwner};
use parcel_ledger_core::shipment::{self, Leg, ShipmentAction};
use parcel_ledger_core::{
    Address, OrderId, OrderStatus, PaymentMethod, PaymentStatus, PayoutStatus, ReturnRequestId,
    ReturnRequestStatus, ShipmentId, ShipmentStatus,
};

use super::events::DomainEvent;
use super::{Context, revenue, settlement, wallets};
use crate::db::UnitOfWork;
use crate::error::AppError;
use crate::models::{Actor, HistoryEntry, NewHistoryEntry, NewShipment, Order, Shipment};

/// Which actions a locked shipment should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    One(ShipmentAction),
    /// Move a stalled `PICKING` shipment on to its in-transit status.
    AutoFromPicking,
}

impl Plan {
    fn actions(self, leg: Leg) -> Vec<ShipmentAction> {
        match self {
            Self::One(action) => vec![action],
            Self::AutoFromPicking => shipment::auto_advance_from_picking(leg).to_vec(),
        }
    }
}

/// Shipment operations.
#[derive(Clone)]
pub struct ShipmentService {
    ctx: Arc<Context>,
}

impl ShipmentService {
    pub(crate) const fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Create the forward shipment for an order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order, `InvalidStateTransition`
    /// unless the order is `PENDING` or `CONFIRMED`, and `Conflict` when the
    /// order already has a shipment in flight.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_shipment(&self, order_id: OrderId, actor: Actor) -> Result<Shipment, AppError> {
        let snapshot = self
            .ctx
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        let now = self.ctx.now();
        let expected = self
            .estimate(&snapshot.pickup_address, &snapshot.delivery_address, now)
            .await;

        let mut uow = self.ctx.store.begin().await?;
        let mut order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(AppError::InvalidStateTransition(format!(
                "order {order_id} is {}; shipments are created for PENDING or CONFIRMED orders",
                order.status
            )));
        }
        if let Some(active) = uow.active_shipment_for_order(order_id).await? {
            return Err(AppError::Conflict(format!(
                "order {order_id} already has shipment {} in {}",
                active.id, active.status
            )));
        }

        let shipment = uow
            .insert_shipment(NewShipment {
                order_id,
                is_return_shipment: false,
                return_request_id: None,
                from_address: order.pickup_address.clone(),
                to_address: order.delivery_address.clone(),
                fee: order.shipping_fee,
                expected_delivery_at: expected,
                created_at: now,
            })
            .await?;
        uow.append_history(NewHistoryEntry {
            shipment_id: shipment.id,
            status: shipment.status,
            message: "Shipment created".to_string(),
            actor,
            created_at: now,
        })
        .await?;

        if let Some(status) = shipment::order_status_for(shipment.status, Leg::Forward) {
            order.status = status;
            order.updated_at = now;
            uow.save_order(&order).await?;
        }
        uow.commit().await?;

        info!(shipment_id = %shipment.id, "Shipment created");
        Ok(shipment)
    }

    /// Create the reverse leg for an approved return request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidStateTransition` unless the request is
    /// `APPROVED` and its goods must travel back, and `Conflict` when a
    /// return shipment already exists or another shipment is in flight.
    #[instrument(skip(self), fields(return_request_id = %request_id))]
    pub async fn create_return_shipment(
        &self,
        request_id: ReturnRequestId,
        actor: Actor,
    ) -> Result<Shipment, AppError> {
        let order_id = self
            .ctx
            .store
            .return_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {request_id}")))?
            .order_id;
        let snapshot = self
            .ctx
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        let now = self.ctx.now();
        let expected = self
            .estimate(&snapshot.delivery_address, &snapshot.pickup_address, now)
            .await;

        let mut uow = self.ctx.store.begin().await?;
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {order_id}")))?;
        let mut request = uow
            .lock_return_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {request_id}")))?;

        if request.status != ReturnRequestStatus::Approved || !request.requires_return {
            return Err(AppError::InvalidStateTransition(format!(
                "return request {request_id} is {} and {}; a return shipment needs an approved request whose goods travel back",
                request.status,
                if request.requires_return {
                    "requires return"
                } else {
                    "does not require return"
                }
            )));
        }
        if let Some(existing) = request.return_shipment_id {
            return Err(AppError::Conflict(format!(
                "return request {request_id} already has shipment {existing}"
            )));
        }
        if let Some(active) = uow.active_shipment_for_order(order_id).await? {
            return Err(AppError::Conflict(format!(
                "order {order_id} already has shipment {} in {}",
                active.id, active.status
            )));
        }

        let shipment = uow
            .insert_shipment(NewShipment {
                order_id,
                is_return_shipment: true,
                return_request_id: Some(request_id),
                from_address: order.delivery_address.clone(),
                to_address: order.pickup_address.clone(),
                fee: Decimal::ZERO,
                expected_delivery_at: expected,
                created_at: now,
            })
            .await?;
        uow.append_history(NewHistoryEntry {
            shipment_id: shipment.id,
            status: shipment.status,
            message: "Return shipment created".to_string(),
            actor,
            created_at: now,
        })
        .await?;

        request.return_shipment_id = Some(shipment.id);
        request.updated_at = now;
        uow.save_return_request(&request).await?;
        uow.commit().await?;

        info!(shipment_id = %shipment.id, "Return shipment created");
        Ok(shipment)
    }

    /// Apply one action to a shipment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment and
    /// `InvalidStateTransition` when the current status is not the action's
    /// predecessor; the shipment is then unchanged. Ledger errors from the
    /// side effects roll the whole transition back.
    #[instrument(skip(self), fields(shipment_id = %id, action = %action, actor = %actor))]
    pub async fn transition(
        &self,
        id: ShipmentId,
        action: ShipmentAction,
        actor: Actor,
    ) -> Result<Shipment, AppError> {
        self.advance(id, None, Plan::One(action), actor)
            .await?
            .ok_or_else(|| AppError::Internal(format!("shipment {id} transition was skipped")))
    }

    /// Apply a plan to a shipment, optionally only if it is still in
    /// `expected` once locked. `Ok(None)` means it had moved on.
    pub(crate) async fn advance(
        &self,
        id: ShipmentId,
        expected: Option<ShipmentStatus>,
        plan: Plan,
        actor: Actor,
    ) -> Result<Option<Shipment>, AppError> {
        let now = self.ctx.now();
        let mut uow = self.ctx.store.begin().await?;
        let mut shipment = uow
            .lock_shipment(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("shipment {id}")))?;

        if expected.is_some_and(|status| status != shipment.status) {
            return Ok(None);
        }

        let mut order = uow
            .lock_order(shipment.order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("order {}", shipment.order_id)))?;

        let mut events = Vec::new();
        for action in plan.actions(shipment.leg()) {
            self.step(
                uow.as_mut(),
                &mut shipment,
                &mut order,
                action,
                actor,
                now,
                &mut events,
            )
            .await?;
        }
        uow.commit().await?;

        self.ctx.notifier.dispatch(&events).await;
        Ok(Some(shipment))
    }

    #[allow(clippy::too_many_arguments)]
    async fn step(
        &self,
        uow: &mut dyn UnitOfWork,
        shipment: &mut Shipment,
        order: &mut Order,
        action: ShipmentAction,
        actor: Actor,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> Result<(), AppError> {
        let leg = shipment.leg();
        let from = shipment.status;
        let to = shipment::next_status(from, action, leg)?;

        shipment.status = to;
        shipment.status_changed_at = now;
        shipment.updated_at = now;
        uow.save_shipment(shipment).await?;
        uow.append_history(NewHistoryEntry {
            shipment_id: shipment.id,
            status: to,
            message: action.history_message().to_string(),
            actor,
            created_at: now,
        })
        .await?;

        if let Some(status) = shipment::order_status_for(to, leg) {
            order.status = status;
        }

        match (leg, to) {
            (Leg::Forward, ShipmentStatus::Delivered) => {
                self.on_delivered(uow, order, now).await?;
            }
            (Leg::Forward, ShipmentStatus::Returned) => {
                self.on_forward_returned(uow, order, now, events).await?;
            }
            (Leg::Return, ShipmentStatus::Returned) => {
                self.on_return_completed(uow, shipment, order, now, events)
                    .await?;
            }
            _ => {}
        }

        order.updated_at = now;
        uow.save_order(order).await?;

        info!(
            shipment_id = %shipment.id,
            from = %from,
            to = %to,
            "Shipment transitioned"
        );
        events.push(DomainEvent::ShipmentTransitioned {
            shipment_id: shipment.id,
            order_id: order.id,
            buyer_id: order.buyer_id,
            store_id: order.store_id,
            from,
            to,
            is_return_shipment: shipment.is_return_shipment,
            actor,
        });
        Ok(())
    }

    /// Payout computation, revenue rows, and the COD collection.
    async fn on_delivered(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let fees = self.ctx.settings.fees;
        let payout = fees.store_payout(order.product_revenue, order.shipping_fee);
        order.store_payout = Some(payout);
        order.delivered_at = Some(now);

        revenue::record_delivery(uow, order, &fees, now).await?;

        if order.payment_method == PaymentMethod::Cod {
            order.payment_status = PaymentStatus::Paid;
            if order.payout_status == PayoutStatus::Unscheduled {
                if payout > Decimal::ZERO {
                    wallets::post(
                        uow,
                        WalletOwner::Store(order.store_id),
                        Posting::AddPending(payout),
                        &format!("Cash collected for order {}", order.id),
                        Some(order.id),
                        now,
                    )
                    .await?;
                }
                order.payout_status = PayoutStatus::Pending;
            }
        }
        Ok(())
    }

    /// Undelivered goods are back with the store: refund a pre-paid buyer.
    async fn on_forward_returned(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &mut Order,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> Result<(), AppError> {
        if order.payment_method == PaymentMethod::Prepaid
            && order.payment_status == PaymentStatus::Paid
            && order.amount_paid > Decimal::ZERO
        {
            let description = format!("Refund for undelivered order {}", order.id);
            let channel = settlement::refund_buyer(
                &self.ctx,
                uow,
                order,
                order.amount_paid,
                &description,
                now,
            )
            .await?;
            order.payment_status = PaymentStatus::Refunded;
            events.push(DomainEvent::RefundIssued {
                order_id: order.id,
                buyer_id: order.buyer_id,
                amount: order.amount_paid,
                channel,
            });
        }

        if order.payout_status == PayoutStatus::Pending {
            let payout = order.store_payout.unwrap_or_default();
            if payout > Decimal::ZERO {
                wallets::post(
                    uow,
                    WalletOwner::Store(order.store_id),
                    Posting::DeductPending(payout),
                    &format!("Payout reversed for returned order {}", order.id),
                    Some(order.id),
                    now,
                )
                .await?;
            }
            order.payout_status = PayoutStatus::Reversed;
        }
        Ok(())
    }

    /// Goods from a return request reached the store: apply a deferred refund.
    async fn on_return_completed(
        &self,
        uow: &mut dyn UnitOfWork,
        shipment: &Shipment,
        order: &mut Order,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> Result<(), AppError> {
        let Some(request_id) = shipment.return_request_id else {
            warn!(shipment_id = %shipment.id, "Return shipment has no return request");
            return Ok(());
        };
        let mut request = uow
            .lock_return_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("return request {request_id}")))?;

        request.status = ReturnRequestStatus::Returned;
        request.updated_at = now;
        if let Some(resolution) = request.resolution {
            settlement::settle(uow, order, &mut request, resolution, now, events).await?;
        }
        uow.save_return_request(&request).await?;
        Ok(())
    }

    /// Fill in a missing delivery estimate.
    ///
    /// Returns `false` when the shipment already has one or is no longer in
    /// flight once locked.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment and `Internal` when the
    /// estimator has no answer.
    #[instrument(skip(self), fields(shipment_id = %id))]
    pub async fn backfill_estimate(&self, id: ShipmentId) -> Result<bool, AppError> {
        let snapshot = self.get(id).await?;
        let now = self.ctx.now();
        let days = self
            .ctx
            .estimator
            .estimate_delivery_days(&snapshot.from_address, &snapshot.to_address)
            .await
            .map_err(|e| AppError::Internal(format!("estimate for shipment {id}: {e}")))?;

        let mut uow = self.ctx.store.begin().await?;
        let mut shipment = uow
            .lock_shipment(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("shipment {id}")))?;
        if shipment.expected_delivery_at.is_some() || !shipment.status.is_in_flight() {
            return Ok(false);
        }

        shipment.expected_delivery_at = Some(shipment.created_at + Duration::days(i64::from(days)));
        shipment.updated_at = now;
        uow.save_shipment(&mut shipment).await?;
        uow.commit().await?;
        Ok(true)
    }

    /// Shipment by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when absent.
    pub async fn get(&self, id: ShipmentId) -> Result<Shipment, AppError> {
        self.ctx
            .store
            .shipment(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("shipment {id}")))
    }

    /// Audit history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown shipment.
    pub async fn history(&self, id: ShipmentId) -> Result<Vec<HistoryEntry>, AppError> {
        self.get(id).await?;
        Ok(self.ctx.store.shipment_history(id).await?)
    }

    async fn estimate(
        &self,
        from: &Address,
        to: &Address,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self.ctx.estimator.estimate_delivery_days(from, to).await {
            Ok(days) => Some(now + Duration::days(i64::from(days))),
            Err(e) => {
                warn!(error = %e, "Delivery estimate unavailable, leaving it for backfill");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testing::{self, FailingNotifier, harness, new_order, seed_order};
    use super::super::{Dependencies, RegionEstimator, Services, Settings};
    use super::*;
    use crate::db::{LedgerStore, MemoryStore};
    use crate::services::ManualClock;
    use parcel_ledger_core::RevenueType;
    use parcel_ledger_core::ledger::TransactionType;
    use rust_decimal_macros::dec;

    const SHIPPER: Actor = Actor::Shipper(7);

    async fn walk(services: &Services, id: ShipmentId, actions: &[ShipmentAction]) -> Shipment {
        let mut last = None;
        for action in actions {
            last = Some(
                services
                    .shipments
                    .transition(id, *action, SHIPPER)
                    .await
                    .unwrap(),
            );
        }
        last.unwrap()
    }

    const TO_SHIPPING: [ShipmentAction; 3] = [
        ShipmentAction::PickingUp,
        ShipmentAction::PickedUp,
        ShipmentAction::StartShipping,
    ];

    #[tokio::test]
    async fn test_create_shipment_snapshots_order() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(100), dec!(10))).await;

        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        assert_eq!(shipment.status, ShipmentStatus::ReadyToPick);
        assert_eq!(shipment.fee, dec!(10));
        assert_eq!(shipment.to_address, order.delivery_address);
        assert_eq!(
            shipment.expected_delivery_at,
            Some(testing::start() + Duration::days(4))
        );

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_second_shipment_for_order_conflicts() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(100), dec!(10))).await;
        let shipments = &h.services.shipments;
        shipments.create_shipment(order.id, Actor::System).await.unwrap();

        let err = shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_invalid_action_leaves_shipment_unchanged() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(100), dec!(10))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();

        let err = h
            .services
            .shipments
            .transition(shipment.id, ShipmentAction::Deliver, SHIPPER)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATE_TRANSITION");

        let after = h.services.shipments.get(shipment.id).await.unwrap();
        assert_eq!(after, shipment);
        assert_eq!(h.services.shipments.history(shipment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cod_delivery_stages_payout() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(200), dec!(15))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();

        walk(&h.services, shipment.id, &TO_SHIPPING).await;
        let delivered = walk(&h.services, shipment.id, &[ShipmentAction::Deliver]).await;
        assert_eq!(delivered.status, ShipmentStatus::Delivered);

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.payout_status, PayoutStatus::Pending);
        // 200 - min(5% of 200, cap) + 15
        assert_eq!(order.store_payout, Some(dec!(205)));

        let store = h
            .services
            .wallets
            .get_or_create(WalletOwner::Store(order.store_id))
            .await
            .unwrap();
        assert_eq!(store.balances.pending_amount, dec!(205));
        assert_eq!(store.balances.balance, Decimal::ZERO);

        let buyer_txs = h
            .services
            .wallets
            .transactions(WalletOwner::Buyer(order.buyer_id))
            .await
            .unwrap();
        assert!(buyer_txs.is_empty());

        let revenue = h.store.revenue_for_order(order.id).await.unwrap();
        let service_fee = revenue
            .iter()
            .find(|r| r.revenue_type == RevenueType::ServiceFee)
            .unwrap();
        assert_eq!(service_fee.amount, dec!(10));
    }

    #[tokio::test]
    async fn test_prepaid_delivery_only_books_revenue() {
        let h = harness();
        let mut new = new_order(PaymentMethod::Prepaid, dec!(100), dec!(10));
        new.platform_discount = dec!(5);
        let order = seed_order(&h.store, new).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        walk(&h.services, shipment.id, &TO_SHIPPING).await;
        walk(&h.services, shipment.id, &[ShipmentAction::Deliver]).await;

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.payout_status, PayoutStatus::Unscheduled);
        assert!(
            h.services
                .wallets
                .transactions(WalletOwner::Store(order.store_id))
                .await
                .unwrap()
                .is_empty()
        );

        let revenue = h.store.revenue_for_order(order.id).await.unwrap();
        assert_eq!(revenue.len(), 3);
        let loss = revenue
            .iter()
            .find(|r| r.revenue_type == RevenueType::PlatformDiscountLoss)
            .unwrap();
        assert_eq!(loss.amount, dec!(-5));
    }

    #[tokio::test]
    async fn test_failed_delivery_return_cancels_and_refunds_prepaid() {
        let gateway = Arc::new(testing::StubGateway::new(false));
        let h = testing::harness_with(Some(gateway.clone()), Settings::default());
        let order = seed_order(&h.store, new_order(PaymentMethod::Prepaid, dec!(80), dec!(20))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        walk(&h.services, shipment.id, &TO_SHIPPING).await;
        walk(
            &h.services,
            shipment.id,
            &[
                ShipmentAction::DeliverFail,
                ShipmentAction::StartReturning,
                ShipmentAction::CompleteReturn,
            ],
        )
        .await;

        let order = h.store.order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Refunded);

        let calls = gateway.calls.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].idempotency_key, order.id.to_string());

        let buyer_txs = h
            .services
            .wallets
            .transactions(WalletOwner::Buyer(order.buyer_id))
            .await
            .unwrap();
        assert_eq!(buyer_txs.len(), 1);
        assert_eq!(buyer_txs[0].transaction_type, TransactionType::Refund);
        assert_eq!(buyer_txs[0].amount, dec!(100));
    }

    #[tokio::test]
    async fn test_gateway_refund_skips_wallet() {
        let gateway = Arc::new(testing::StubGateway::new(true));
        let h = testing::harness_with(Some(gateway), Settings::default());
        let order = seed_order(&h.store, new_order(PaymentMethod::Prepaid, dec!(80), dec!(20))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        walk(&h.services, shipment.id, &TO_SHIPPING).await;
        walk(
            &h.services,
            shipment.id,
            &[
                ShipmentAction::DeliverFail,
                ShipmentAction::StartReturning,
                ShipmentAction::CompleteReturn,
            ],
        )
        .await;

        assert!(
            h.services
                .wallets
                .transactions(WalletOwner::Buyer(order.buyer_id))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_block_transition() {
        let store = Arc::new(MemoryStore::new());
        let services = Services::new(
            Dependencies {
                store: store.clone(),
                clock: Arc::new(ManualClock::new(testing::start())),
                notifier: Arc::new(FailingNotifier),
                gateway: None,
                estimator: Arc::new(RegionEstimator::new(
                    crate::config::EstimatorConfig::default(),
                )),
            },
            Settings::default(),
        );
        let order = seed_order(&store, new_order(PaymentMethod::Cod, dec!(50), dec!(5))).await;
        let shipment = services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();

        let moved = services
            .shipments
            .transition(shipment.id, ShipmentAction::PickingUp, SHIPPER)
            .await
            .unwrap();
        assert_eq!(moved.status, ShipmentStatus::Picking);
    }

    #[tokio::test]
    async fn test_transition_notifies_after_commit() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(50), dec!(5))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        h.services
            .shipments
            .transition(shipment.id, ShipmentAction::PickingUp, SHIPPER)
            .await
            .unwrap();
        assert_eq!(h.notifier.sent.lock().len(), 2);

        let _ = h
            .services
            .shipments
            .transition(shipment.id, ShipmentAction::PickingUp, SHIPPER)
            .await;
        assert_eq!(h.notifier.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_history_records_actor() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(50), dec!(5))).await;
        let shipment = h
            .services
            .shipments
            .create_shipment(order.id, Actor::Admin(1))
            .await
            .unwrap();
        walk(&h.services, shipment.id, &[ShipmentAction::PickingUp]).await;

        let history = h.services.shipments.history(shipment.id).await.unwrap();
        let actors: Vec<_> = history.iter().map(|e| e.actor).collect();
        assert_eq!(actors, vec![Actor::Admin(1), SHIPPER]);
        assert_eq!(history[1].status, ShipmentStatus::Picking);
    }

    #[tokio::test]
    async fn test_backfill_fills_missing_estimate_once() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(50), dec!(5))).await;
        let mut uow = h.store.begin().await.unwrap();
        let shipment = uow
            .insert_shipment(NewShipment {
                order_id: order.id,
                is_return_shipment: false,
                return_request_id: None,
                from_address: testing::address("Hue"),
                to_address: testing::address("Hue"),
                fee: dec!(5),
                expected_delivery_at: None,
                created_at: testing::start(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert!(h.services.shipments.backfill_estimate(shipment.id).await.unwrap());
        assert!(!h.services.shipments.backfill_estimate(shipment.id).await.unwrap());

        let shipment = h.services.shipments.get(shipment.id).await.unwrap();
        assert_eq!(
            shipment.expected_delivery_at,
            Some(testing::start() + Duration::days(2))
        );
    }
}
