//! Persistence for the ledger service.
//!
//! Every use case runs inside one [`UnitOfWork`]: all aggregates it touches
//! are locked when loaded, every guard is evaluated after the lock is held,
//! and nothing is visible to other units until [`UnitOfWork::commit`].
//! Dropping a unit without committing rolls it back.
//!
//! Two backends implement the traits:
//!
//! - [`postgres::PgLedgerStore`] - one SQL transaction per unit, row locks via
//!   `SELECT ... FOR UPDATE`, version-checked updates
//! - [`memory::MemoryStore`] - an exclusive lock over a working copy of the
//!   whole state, swapped in on commit (tests and local runs)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p parcel-ledger-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use parcel_ledger_core::ledger::WalletOwner;
use parcel_ledger_core::{
    OrderId, ReturnRequestId, ShipmentId, ShipmentStatus, WalletId, WithdrawalRequestId,
};

use crate::models::{
    AdminRevenue, HistoryEntry, NewAdminRevenue, NewHistoryEntry, NewOrder, NewReturnRequest,
    NewShipment, NewTransaction, NewWithdrawalRequest, Order, ReturnRequest, Shipment,
    Transaction, Wallet, WithdrawalRequest,
};

pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or a stale versioned update.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Entry point to persistence: opens units of work and serves reads.
///
/// Reads see committed state only. A service must not call a read method
/// while it holds an open unit of work; the in-memory backend would wait on
/// itself.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;

    /// Backend round-trip, for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;

    async fn shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError>;

    /// History of a shipment, oldest first.
    async fn shipment_history(&self, id: ShipmentId) -> Result<Vec<HistoryEntry>, RepositoryError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn return_request(
        &self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError>;

    async fn wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, RepositoryError>;

    /// A wallet's transactions in insertion order.
    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, RepositoryError>;

    async fn withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError>;

    async fn revenue_for_order(&self, order_id: OrderId)
    -> Result<Vec<AdminRevenue>, RepositoryError>;

    /// Shipments that entered `status` at or before `entered_before`, oldest first.
    async fn shipments_in_status_since(
        &self,
        status: ShipmentStatus,
        entered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShipmentId>, RepositoryError>;

    /// In-flight shipments without an expected delivery date.
    async fn shipments_missing_estimate(&self, limit: i64)
    -> Result<Vec<ShipmentId>, RepositoryError>;

    /// Orders whose payout is `PENDING`, delivered at or before
    /// `delivered_before`, and not held by an unsettled return request.
    /// Oldest delivery first.
    async fn payouts_due(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>, RepositoryError>;
}

/// One all-or-nothing persistence scope.
///
/// `lock_*` methods load an aggregate and hold it exclusively until the unit
/// ends. `save_*` methods write back a locked aggregate, check its `version`
/// where it has one, and bump it in place.
#[async_trait]
pub trait UnitOfWork: Send {
    // Orders
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError>;
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn save_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

    // Shipments
    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, RepositoryError>;
    async fn lock_shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError>;
    /// The order's shipment that is not yet `DELIVERED` or `RETURNED`, if any.
    ///
    /// Not locked: callers hold the order lock, and a shipment is always
    /// locked before its order. A racing insert is caught by the
    /// one-active-shipment index and surfaces as `Conflict`.
    async fn active_shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError>;
    async fn save_shipment(&mut self, shipment: &mut Shipment) -> Result<(), RepositoryError>;
    async fn append_history(&mut self, entry: NewHistoryEntry)
    -> Result<HistoryEntry, RepositoryError>;

    // Return requests
    async fn insert_return_request(
        &mut self,
        request: NewReturnRequest,
    ) -> Result<ReturnRequest, RepositoryError>;
    async fn lock_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError>;
    /// The order's return request whose money has not been settled yet.
    async fn unsettled_return_request(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<ReturnRequest>, RepositoryError>;
    async fn save_return_request(&mut self, request: &ReturnRequest)
    -> Result<(), RepositoryError>;

    // Wallets
    /// Lock the owner's wallet, creating an empty one first if needed.
    ///
    /// Concurrent first-time creation for one owner yields a single wallet.
    async fn lock_or_create_wallet(
        &mut self,
        owner: WalletOwner,
        now: DateTime<Utc>,
    ) -> Result<Wallet, RepositoryError>;
    async fn save_wallet(&mut self, wallet: &mut Wallet) -> Result<(), RepositoryError>;
    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, RepositoryError>;

    // Withdrawals
    async fn insert_withdrawal(
        &mut self,
        request: NewWithdrawalRequest,
    ) -> Result<WithdrawalRequest, RepositoryError>;
    async fn lock_withdrawal(
        &mut self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError>;
    /// Whether the owner has a `PENDING` or `APPROVED` request.
    async fn has_open_withdrawal(&mut self, owner: WalletOwner) -> Result<bool, RepositoryError>;
    async fn save_withdrawal(&mut self, request: &WithdrawalRequest)
    -> Result<(), RepositoryError>;

    // Revenue
    /// Insert a revenue row unless one exists for `(order_id, revenue_type)`.
    ///
    /// Returns `false` when the row already existed.
    async fn insert_revenue(&mut self, revenue: NewAdminRevenue) -> Result<bool, RepositoryError>;

    /// Make every change visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}
