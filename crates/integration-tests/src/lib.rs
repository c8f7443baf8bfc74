//! Integration tests for Parcel Ledger.
//!
//! # Running Tests
//!
//! ```bash
//! # Scenario tests run against the in-memory store
//! cargo test -p parcel-ledger-integration-tests
//!
//! # Postgres tests need a migrated database
//! LEDGER_DATABASE_URL=postgres://... cargo test -p parcel-ledger-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `fulfillment` - Shipment lifecycles and their money side effects
//! - `wallets` - Ledger replay and withdrawals
//! - `disputes` - Return requests, settlement, and payout release
//! - `postgres` - The same unit-of-work contract against a real database

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use parcel_ledger_core::ledger::{TransactionType, WalletOwner};
use parcel_ledger_core::shipment::ShipmentAction;
use parcel_ledger_core::{Address, PaymentMethod, PaymentStatus, StoreId, UserId};
use parcel_ledger_server::config::EstimatorConfig;
use parcel_ledger_server::db::{LedgerStore, MemoryStore};
use parcel_ledger_server::models::{Actor, NewOrder, Order, Shipment, Transaction};
use parcel_ledger_server::services::{
    Dependencies, GatewayError, ManualClock, Notification, NotificationError,
    NotificationSender, PaymentGateway, RefundOutcome, RefundRequest, RegionEstimator, Services,
    Settings,
};

pub const BUYER_ID: UserId = UserId::new(100);
pub const STORE_ID: StoreId = StoreId::new(200);
pub const BUYER: WalletOwner = WalletOwner::Buyer(BUYER_ID);
pub const STORE: WalletOwner = WalletOwner::Store(STORE_ID);

/// Forward actions from `READY_TO_PICK` to `SHIPPING`.
pub const TO_SHIPPING: [ShipmentAction; 3] = [
    ShipmentAction::PickingUp,
    ShipmentAction::PickedUp,
    ShipmentAction::StartShipping,
];

#[must_use]
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

#[must_use]
pub fn address(region: &str) -> Address {
    Address {
        contact_name: "Linh".to_string(),
        phone: "0912345678".to_string(),
        street: "12 Le Loi".to_string(),
        district: "Hai Chau".to_string(),
        region: region.to_string(),
    }
}

/// Keeps every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Always fails.
pub struct DownNotifier;

#[async_trait]
impl NotificationSender for DownNotifier {
    async fn notify(&self, _: &Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Request("connection refused".to_string()))
    }
}

/// Approves or declines every refund and records the requests.
pub struct FakeGateway {
    pub approve: bool,
    pub requests: Mutex<Vec<RefundRequest>>,
}

impl FakeGateway {
    #[must_use]
    pub fn new(approve: bool) -> Self {
        Self {
            approve,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError> {
        self.requests.lock().push(request.clone());
        Ok(RefundOutcome {
            success: self.approve,
            refund_ref: self.approve.then(|| "rf-1".to_string()),
        })
    }
}

/// Services over an in-memory store with a hand-driven clock.
pub struct TestContext {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, Arc::new(RecordingNotifier::default()), Settings::default())
    }

    #[must_use]
    pub fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::build(
            Some(gateway),
            Arc::new(RecordingNotifier::default()),
            Settings::default(),
        )
    }

    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        Self::build(None, Arc::new(RecordingNotifier::default()), settings)
    }

    /// Services whose notifications all fail.
    #[must_use]
    pub fn with_broken_notifier() -> Self {
        let mut ctx = Self::new();
        ctx.services = Services::new(
            Dependencies {
                store: ctx.store.clone(),
                clock: ctx.clock.clone(),
                notifier: Arc::new(DownNotifier),
                gateway: None,
                estimator: Arc::new(RegionEstimator::new(EstimatorConfig::default())),
            },
            Settings::default(),
        );
        ctx
    }

    fn build(
        gateway: Option<Arc<dyn PaymentGateway>>,
        notifier: Arc<RecordingNotifier>,
        settings: Settings,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let services = Services::new(
            Dependencies {
                store: store.clone(),
                clock: clock.clone(),
                notifier: notifier.clone(),
                gateway,
                estimator: Arc::new(RegionEstimator::new(EstimatorConfig::default())),
            },
            settings,
        );
        Self {
            services,
            store,
            clock,
            notifier,
        }
    }

    /// Insert an order the way checkout would leave it.
    pub async fn order(&self, method: PaymentMethod, product: Decimal, shipping: Decimal) -> Order {
        self.order_with_discount(method, product, shipping, Decimal::ZERO)
            .await
    }

    pub async fn order_with_discount(
        &self,
        method: PaymentMethod,
        product: Decimal,
        shipping: Decimal,
        discount: Decimal,
    ) -> Order {
        let prepaid = method == PaymentMethod::Prepaid;
        let mut uow = self.store.begin().await.unwrap();
        let order = uow
            .insert_order(NewOrder {
                buyer_id: BUYER_ID,
                store_id: STORE_ID,
                payment_method: method,
                payment_status: if prepaid {
                    PaymentStatus::Paid
                } else {
                    PaymentStatus::Unpaid
                },
                product_revenue: product,
                shipping_fee: shipping,
                platform_discount: discount,
                amount_paid: if prepaid {
                    product + shipping - discount
                } else {
                    Decimal::ZERO
                },
                payment_ref: prepaid.then(|| "pay-7781".to_string()),
                pickup_address: address("Da Nang"),
                delivery_address: address("Ha Noi"),
                created_at: self.clock_now(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        order
    }

    /// Create a shipment and apply `actions` as shipper 9.
    pub async fn ship(&self, order: &Order, actions: &[ShipmentAction]) -> Shipment {
        let mut shipment = self
            .services
            .shipments
            .create_shipment(order.id, Actor::System)
            .await
            .unwrap();
        for &action in actions {
            shipment = self
                .services
                .shipments
                .transition(shipment.id, action, Actor::Shipper(9))
                .await
                .unwrap();
        }
        shipment
    }

    /// Create a shipment and drive it to `DELIVERED`.
    pub async fn deliver(&self, order: &Order) -> Shipment {
        let mut actions = TO_SHIPPING.to_vec();
        actions.push(ShipmentAction::Deliver);
        self.ship(order, &actions).await
    }

    pub async fn reload(&self, order: &Order) -> Order {
        self.store.order(order.id).await.unwrap().unwrap()
    }

    pub async fn transactions_of(
        &self,
        owner: WalletOwner,
        kind: TransactionType,
    ) -> Vec<Transaction> {
        self.services
            .wallets
            .transactions(owner)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.transaction_type == kind)
            .collect()
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use parcel_ledger_server::services::Clock;
        self.clock.now()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
