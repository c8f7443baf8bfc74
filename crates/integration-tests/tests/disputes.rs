//! Return disputes, settlement, and payout release.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use parcel_ledger_core::ledger::TransactionType;
use parcel_ledger_core::settlement::DisputeResolution;
use parcel_ledger_core::shipment::ShipmentAction;
use parcel_ledger_core::{
    OrderStatus, PaymentMethod, PaymentStatus, PayoutStatus, ReturnRequestStatus, RevenueType,
    ShipmentStatus,
};
use parcel_ledger_integration_tests::{BUYER, FakeGateway, STORE, TestContext};
use parcel_ledger_server::config::SchedulerConfig;
use parcel_ledger_server::db::LedgerStore;
use parcel_ledger_server::models::Actor;
use parcel_ledger_server::services::{Job, Settings};

#[tokio::test]
async fn test_full_refund_moves_money_once() {
    let ctx = TestContext::new();
    let order = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(20000)).await;
    ctx.deliver(&order).await;
    let pending_before = ctx
        .services
        .wallets
        .get_or_create(STORE)
        .await
        .unwrap()
        .balances
        .pending_amount;

    let request = ctx
        .services
        .settlement
        .open_return_request(order.id, "wrong colour", false)
        .await
        .unwrap();
    ctx.services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();
    ctx.services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();

    let refunds = ctx.transactions_of(BUYER, TransactionType::Refund).await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec!(120000));

    // The store returns its 115000 payout; the platform covers the commission.
    let store = ctx.services.wallets.get_or_create(STORE).await.unwrap();
    assert_eq!(store.balances.pending_amount, pending_before - dec!(115000));
    let share = ctx
        .store
        .revenue_for_order(order.id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.revenue_type == RevenueType::DisputeRefundShare)
        .unwrap();
    assert_eq!(share.amount, dec!(-5000));

    let order = ctx.reload(&order).await;
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(order.payout_status, PayoutStatus::Reversed);
}

#[tokio::test]
async fn test_full_refund_leaves_other_payouts_releasable() {
    let ctx = TestContext::new();
    let refunded = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(20000)).await;
    let kept = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(20000)).await;
    ctx.deliver(&refunded).await;
    ctx.deliver(&kept).await;

    let request = ctx
        .services
        .settlement
        .open_return_request(refunded.id, "not as described", false)
        .await
        .unwrap();
    ctx.services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();

    let store = ctx.services.wallets.get_or_create(STORE).await.unwrap();
    assert_eq!(store.balances.pending_amount, dec!(115000));

    ctx.clock.advance(Duration::days(7));
    let report = ctx.services.scheduler.run(Job::PayoutRelease).await.unwrap();
    assert_eq!(report.advanced, 1);
    assert_eq!(report.failed, 0);

    let kept = ctx.reload(&kept).await;
    assert_eq!(kept.payout_status, PayoutStatus::Released);
    assert_eq!(kept.status, OrderStatus::Completed);
    let store = ctx.services.wallets.get_or_create(STORE).await.unwrap();
    assert_eq!(store.balances.balance, dec!(115000));
    assert_eq!(store.balances.pending_amount, Decimal::ZERO);
    assert!(ctx.services.wallets.verify(STORE).await.unwrap().consistent);
}

#[tokio::test]
async fn test_deferred_refund_settles_on_return_leg() {
    let ctx = TestContext::new();
    let order = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(20000)).await;
    ctx.deliver(&order).await;

    let request = ctx
        .services
        .settlement
        .open_return_request(order.id, "defective", true)
        .await
        .unwrap();
    let request = ctx
        .services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();
    assert_eq!(request.status, ReturnRequestStatus::Approved);
    assert!(ctx.transactions_of(BUYER, TransactionType::Refund).await.is_empty());

    let leg = ctx
        .services
        .shipments
        .create_return_shipment(request.id, Actor::Admin(1))
        .await
        .unwrap();
    assert!(leg.is_return_shipment);
    assert_eq!(leg.from_address, order.delivery_address);

    let err = ctx
        .services
        .shipments
        .transition(leg.id, ShipmentAction::StartShipping, Actor::Shipper(9))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "INVALID_STATE_TRANSITION");

    for action in [
        ShipmentAction::PickingUp,
        ShipmentAction::PickedUp,
        ShipmentAction::StartReturning,
    ] {
        ctx.services
            .shipments
            .transition(leg.id, action, Actor::Shipper(9))
            .await
            .unwrap();
    }
    assert_eq!(ctx.reload(&order).await.status, OrderStatus::Returning);
    assert!(ctx.transactions_of(BUYER, TransactionType::Refund).await.is_empty());

    let leg = ctx
        .services
        .shipments
        .transition(leg.id, ShipmentAction::CompleteReturn, Actor::Shipper(9))
        .await
        .unwrap();
    assert_eq!(leg.status, ShipmentStatus::Returned);

    let refunds = ctx.transactions_of(BUYER, TransactionType::Refund).await;
    assert_eq!(refunds.len(), 1);
    let order = ctx.reload(&order).await;
    assert_eq!(order.status, OrderStatus::Returned);
    let request = ctx.services.settlement.get(request.id).await.unwrap();
    assert_eq!(request.status, ReturnRequestStatus::Returned);
    assert!(request.settled_at.is_some());

    let again = ctx
        .services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();
    assert_eq!(again, request);
    assert_eq!(ctx.transactions_of(BUYER, TransactionType::Refund).await.len(), 1);
}

#[tokio::test]
async fn test_payout_release_waits_for_open_dispute() {
    let ctx = TestContext::new();
    let disputed = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(0)).await;
    let clean = ctx.order(PaymentMethod::Cod, dec!(40000), dec!(0)).await;
    ctx.deliver(&disputed).await;
    ctx.deliver(&clean).await;
    ctx.services
        .settlement
        .open_return_request(disputed.id, "never arrived", false)
        .await
        .unwrap();

    ctx.clock.advance(Duration::days(7));
    let report = ctx.services.scheduler.run(Job::PayoutRelease).await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.advanced, 1);

    let store = ctx.services.wallets.get_or_create(STORE).await.unwrap();
    assert_eq!(store.balances.balance, dec!(38000));
    assert_eq!(store.balances.pending_amount, dec!(95000));
    assert_eq!(ctx.reload(&clean).await.status, OrderStatus::Completed);
    assert_eq!(ctx.reload(&disputed).await.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_held_payouts_do_not_block_a_small_batch() {
    let ctx = TestContext::with_settings(Settings {
        scheduler: SchedulerConfig {
            batch_size: 1,
            ..SchedulerConfig::default()
        },
        ..Settings::default()
    });
    let disputed = ctx.order(PaymentMethod::Cod, dec!(100000), dec!(0)).await;
    ctx.deliver(&disputed).await;
    ctx.clock.advance(Duration::hours(1));
    let due = ctx.order(PaymentMethod::Cod, dec!(40000), dec!(0)).await;
    ctx.deliver(&due).await;
    ctx.services
        .settlement
        .open_return_request(disputed.id, "wrong size", false)
        .await
        .unwrap();

    ctx.clock.advance(Duration::days(7));
    let report = ctx.services.scheduler.run(Job::PayoutRelease).await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.advanced, 1);

    assert_eq!(ctx.reload(&due).await.payout_status, PayoutStatus::Released);
    assert_eq!(ctx.reload(&disputed).await.payout_status, PayoutStatus::Pending);
}

#[tokio::test]
async fn test_dispute_refund_skips_gateway() {
    let gateway = Arc::new(FakeGateway::new(true));
    let ctx = TestContext::with_gateway(gateway.clone());
    let order = ctx.order(PaymentMethod::Prepaid, dec!(80000), dec!(15000)).await;
    ctx.deliver(&order).await;

    let request = ctx
        .services
        .settlement
        .open_return_request(order.id, "damaged box", false)
        .await
        .unwrap();
    ctx.services
        .settlement
        .resolve_return_request(request.id, DisputeResolution::FullRefund, None)
        .await
        .unwrap();

    assert!(gateway.requests.lock().is_empty());
    let refunds = ctx.transactions_of(BUYER, TransactionType::Refund).await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec!(95000));
    assert_eq!(
        ctx.reload(&order).await.payment_status,
        PaymentStatus::Refunded
    );
    assert!(ctx.services.wallets.verify(BUYER).await.unwrap().consistent);
}
