//! Scenarios against a real `PostgreSQL` database.
//!
//! Ignored by default. Set `LEDGER_DATABASE_URL` to a scratch database and
//! run with `--ignored`; migrations are applied on connect.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;

use parcel_ledger_core::ledger::{TransactionType, WalletOwner};
use parcel_ledger_core::shipment::ShipmentAction;
use parcel_ledger_core::{OrderStatus, PaymentMethod, PaymentStatus, ShipmentStatus, StoreId, UserId};
use parcel_ledger_integration_tests::{TO_SHIPPING, address};
use parcel_ledger_server::config::EstimatorConfig;
use parcel_ledger_server::db::{self, LedgerStore, PgLedgerStore};
use parcel_ledger_server::models::{Actor, NewOrder, Order};
use parcel_ledger_server::services::{
    Dependencies, LogNotifier, ManualClock, RegionEstimator, Services, Settings,
};

struct PgContext {
    services: Services,
    store: Arc<PgLedgerStore>,
    buyer: UserId,
    store_id: StoreId,
}

impl PgContext {
    async fn connect() -> Self {
        let url = std::env::var("LEDGER_DATABASE_URL").unwrap();
        let pool = db::create_pool(&SecretString::from(url)).await.unwrap();
        sqlx::migrate!("../server/migrations").run(&pool).await.unwrap();

        let store = Arc::new(PgLedgerStore::new(pool));
        let services = Services::new(
            Dependencies {
                store: store.clone(),
                clock: Arc::new(ManualClock::new(Utc::now())),
                notifier: Arc::new(LogNotifier),
                gateway: None,
                estimator: Arc::new(RegionEstimator::new(EstimatorConfig::default())),
            },
            Settings::default(),
        );

        // Fresh owners per run so repeated runs share a database safely.
        let seed = Utc::now().timestamp_micros();
        Self {
            services,
            store,
            buyer: UserId::new(seed),
            store_id: StoreId::new(seed),
        }
    }

    async fn cod_order(&self, product: Decimal, shipping: Decimal) -> Order {
        let mut uow = self.store.begin().await.unwrap();
        let order = uow
            .insert_order(NewOrder {
                buyer_id: self.buyer,
                store_id: self.store_id,
                payment_method: PaymentMethod::Cod,
                payment_status: PaymentStatus::Unpaid,
                product_revenue: product,
                shipping_fee: shipping,
                platform_discount: Decimal::ZERO,
                amount_paid: Decimal::ZERO,
                payment_ref: None,
                pickup_address: address("Can Tho"),
                delivery_address: address("Ha Noi"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        order
    }
}

#[tokio::test]
#[ignore = "Requires LEDGER_DATABASE_URL"]
async fn test_pg_delivery_commits_atomically() {
    let ctx = PgContext::connect().await;
    let order = ctx.cod_order(dec!(250000), dec!(18000)).await;

    let mut shipment = ctx
        .services
        .shipments
        .create_shipment(order.id, Actor::System)
        .await
        .unwrap();
    for action in TO_SHIPPING.into_iter().chain([ShipmentAction::Deliver]) {
        shipment = ctx
            .services
            .shipments
            .transition(shipment.id, action, Actor::Shipper(3))
            .await
            .unwrap();
    }
    assert_eq!(shipment.status, ShipmentStatus::Delivered);

    let history = ctx.services.shipments.history(shipment.id).await.unwrap();
    assert_eq!(history.len(), 5);

    let order = ctx.store.order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.store_payout, Some(dec!(255500)));

    let owner = WalletOwner::Store(ctx.store_id);
    let wallet = ctx.services.wallets.get_or_create(owner).await.unwrap();
    assert_eq!(wallet.balances.pending_amount, dec!(255500));
    assert!(ctx.services.wallets.verify(owner).await.unwrap().consistent);
}

#[tokio::test]
#[ignore = "Requires LEDGER_DATABASE_URL"]
async fn test_pg_failed_transition_rolls_back() {
    let ctx = PgContext::connect().await;
    let order = ctx.cod_order(dec!(90000), dec!(10000)).await;
    let shipment = ctx
        .services
        .shipments
        .create_shipment(order.id, Actor::System)
        .await
        .unwrap();

    let err = ctx
        .services
        .shipments
        .transition(shipment.id, ShipmentAction::Deliver, Actor::Shipper(3))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "INVALID_STATE_TRANSITION");

    let reloaded = ctx.services.shipments.get(shipment.id).await.unwrap();
    assert_eq!(reloaded.status, ShipmentStatus::ReadyToPick);
    assert_eq!(
        ctx.services.shipments.history(shipment.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
#[ignore = "Requires LEDGER_DATABASE_URL"]
async fn test_pg_overdraft_leaves_no_row() {
    let ctx = PgContext::connect().await;
    let buyer = WalletOwner::Buyer(ctx.buyer);
    let wallets = &ctx.services.wallets;

    wallets
        .credit(buyer, dec!(12.50), TransactionType::Refund, "refund", None)
        .await
        .unwrap();
    let err = wallets
        .debit(buyer, dec!(13), TransactionType::Payment, "order", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "INSUFFICIENT_BALANCE");

    let rows = wallets.transactions(buyer).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].balance_after, dec!(12.50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires LEDGER_DATABASE_URL"]
async fn test_pg_create_racing_transition_is_a_conflict() {
    let ctx = Arc::new(PgContext::connect().await);
    let order = ctx.cod_order(dec!(60000), dec!(12000)).await;
    let shipment = ctx
        .services
        .shipments
        .create_shipment(order.id, Actor::System)
        .await
        .unwrap();

    let mover = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            for action in TO_SHIPPING {
                ctx.services
                    .shipments
                    .transition(shipment.id, action, Actor::Shipper(3))
                    .await
                    .unwrap();
            }
        })
    };
    let creators: Vec<_> = (0..8)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                ctx.services
                    .shipments
                    .create_shipment(order.id, Actor::System)
                    .await
            })
        })
        .collect();

    mover.await.unwrap();
    for creator in creators {
        let err = creator.await.unwrap().unwrap_err();
        assert!(
            matches!(err.kind(), "CONFLICT" | "INVALID_STATE_TRANSITION"),
            "unexpected {err:?}"
        );
    }
    let shipment = ctx.services.shipments.get(shipment.id).await.unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Shipping);
}
