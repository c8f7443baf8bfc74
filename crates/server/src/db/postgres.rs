//! `PostgreSQL` ledger store.
//!
//! Each unit of work is one SQL transaction. Aggregates are loaded with
//! `SELECT ... FOR UPDATE`; versioned rows (shipments, wallets) are written
//! back with `WHERE version = $n` so a lost update surfaces as a conflict
//! instead of silently overwriting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};

use parcel_ledger_core::ledger::{TransactionType, WalletBalances, WalletKind, WalletOwner};
use parcel_ledger_core::settlement::DisputeResolution;
use parcel_ledger_core::{
    Address, AdminRevenueId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, PayoutStatus,
    ReturnRequestId, ReturnRequestStatus, ShipmentId, ShipmentStatus, StoreId, TransactionId,
    UserId, WalletId, WithdrawalRequestId, WithdrawalStatus,
};

use super::{LedgerStore, RepositoryError, UnitOfWork};
use crate::models::{
    AdminRevenue, BankDetails, HistoryEntry, NewAdminRevenue, NewHistoryEntry, NewOrder,
    NewReturnRequest, NewShipment, NewTransaction, NewWithdrawalRequest, Order, ReturnRequest,
    Shipment, Transaction, Wallet, WithdrawalRequest,
};

// =============================================================================
// Column Lists
// =============================================================================

const ORDER_COLUMNS: &str = "id, buyer_id, store_id, status, payment_method, payment_status, \
    product_revenue, shipping_fee, platform_discount, amount_paid, payment_ref, \
    pickup_address, delivery_address, store_payout, payout_status, delivered_at, \
    created_at, updated_at";

const SHIPMENT_COLUMNS: &str = "id, order_id, status, is_return_shipment, return_request_id, \
    from_address, to_address, fee, expected_delivery_at, created_at, status_changed_at, \
    updated_at, version";

const HISTORY_COLUMNS: &str = "id, shipment_id, status, message, actor, created_at";

const RETURN_REQUEST_COLUMNS: &str = "id, order_id, buyer_id, store_id, status, reason, \
    requires_return, resolution, admin_note, return_shipment_id, settled_at, created_at, \
    updated_at";

const WALLET_COLUMNS: &str = "id, owner_kind, owner_id, balance, pending_amount, total_earned, \
    total_refunded, total_withdrawn, total_spent, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, transaction_type, amount, pending_delta, \
    balance_before, balance_after, description, order_id, created_at";

const WITHDRAWAL_COLUMNS: &str = "id, wallet_id, owner_kind, owner_id, amount, bank_name, \
    account_number, account_holder, status, admin_note, rejection_reason, transaction_id, \
    processed_at, created_at, updated_at";

const REVENUE_COLUMNS: &str = "id, order_id, revenue_type, amount, description, created_at";

const IN_FLIGHT_STATUSES: &str = "('READY_TO_PICK', 'PICKING', 'PICKED', 'SHIPPING', 'RETURNING')";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    buyer_id: UserId,
    store_id: StoreId,
    status: OrderStatus,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    product_revenue: Decimal,
    shipping_fee: Decimal,
    platform_discount: Decimal,
    amount_paid: Decimal,
    payment_ref: Option<String>,
    pickup_address: Json<Address>,
    delivery_address: Json<Address>,
    store_payout: Option<Decimal>,
    payout_status: PayoutStatus,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            buyer_id: row.buyer_id,
            store_id: row.store_id,
            status: row.status,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            product_revenue: row.product_revenue,
            shipping_fee: row.shipping_fee,
            platform_discount: row.platform_discount,
            amount_paid: row.amount_paid,
            payment_ref: row.payment_ref,
            pickup_address: row.pickup_address.0,
            delivery_address: row.delivery_address.0,
            store_payout: row.store_payout,
            payout_status: row.payout_status,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShipmentRow {
    id: ShipmentId,
    order_id: OrderId,
    status: ShipmentStatus,
    is_return_shipment: bool,
    return_request_id: Option<ReturnRequestId>,
    from_address: Json<Address>,
    to_address: Json<Address>,
    fee: Decimal,
    expected_delivery_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    status_changed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl From<ShipmentRow> for Shipment {
    fn from(row: ShipmentRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            status: row.status,
            is_return_shipment: row.is_return_shipment,
            return_request_id: row.return_request_id,
            from_address: row.from_address.0,
            to_address: row.to_address.0,
            fee: row.fee,
            expected_delivery_at: row.expected_delivery_at,
            created_at: row.created_at,
            status_changed_at: row.status_changed_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    shipment_id: ShipmentId,
    status: ShipmentStatus,
    message: String,
    actor: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = RepositoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let actor = row.actor.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid actor in shipment history: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            shipment_id: row.shipment_id,
            status: row.status,
            message: row.message,
            actor,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReturnRequestRow {
    id: ReturnRequestId,
    order_id: OrderId,
    buyer_id: UserId,
    store_id: StoreId,
    status: ReturnRequestStatus,
    reason: String,
    requires_return: bool,
    resolution: Option<Json<DisputeResolution>>,
    admin_note: Option<String>,
    return_shipment_id: Option<ShipmentId>,
    settled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReturnRequestRow> for ReturnRequest {
    fn from(row: ReturnRequestRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            buyer_id: row.buyer_id,
            store_id: row.store_id,
            status: row.status,
            reason: row.reason,
            requires_return: row.requires_return,
            resolution: row.resolution.map(|r| r.0),
            admin_note: row.admin_note,
            return_shipment_id: row.return_shipment_id,
            settled_at: row.settled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: WalletId,
    owner_kind: WalletKind,
    owner_id: i64,
    balance: Decimal,
    pending_amount: Decimal,
    total_earned: Decimal,
    total_refunded: Decimal,
    total_withdrawn: Decimal,
    total_spent: Decimal,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            id: row.id,
            owner: WalletOwner::from_parts(row.owner_kind, row.owner_id),
            balances: WalletBalances {
                balance: row.balance,
                pending_amount: row.pending_amount,
                total_earned: row.total_earned,
                total_refunded: row.total_refunded,
                total_withdrawn: row.total_withdrawn,
                total_spent: row.total_spent,
            },
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: TransactionId,
    wallet_id: WalletId,
    transaction_type: TransactionType,
    amount: Decimal,
    pending_delta: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    description: String,
    order_id: Option<OrderId>,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            wallet_id: row.wallet_id,
            transaction_type: row.transaction_type,
            amount: row.amount,
            pending_delta: row.pending_delta,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            description: row.description,
            order_id: row.order_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WithdrawalRow {
    id: WithdrawalRequestId,
    wallet_id: WalletId,
    owner_kind: WalletKind,
    owner_id: i64,
    amount: Decimal,
    bank_name: String,
    account_number: String,
    account_holder: String,
    status: WithdrawalStatus,
    admin_note: Option<String>,
    rejection_reason: Option<String>,
    transaction_id: Option<TransactionId>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WithdrawalRow> for WithdrawalRequest {
    fn from(row: WithdrawalRow) -> Self {
        Self {
            id: row.id,
            wallet_id: row.wallet_id,
            owner: WalletOwner::from_parts(row.owner_kind, row.owner_id),
            amount: row.amount,
            bank: BankDetails {
                bank_name: row.bank_name,
                account_number: row.account_number,
                account_holder: row.account_holder,
            },
            status: row.status,
            admin_note: row.admin_note,
            rejection_reason: row.rejection_reason,
            transaction_id: row.transaction_id,
            processed_at: row.processed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RevenueRow {
    id: AdminRevenueId,
    order_id: OrderId,
    revenue_type: parcel_ledger_core::RevenueType,
    amount: Decimal,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<RevenueRow> for AdminRevenue {
    fn from(row: RevenueRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            revenue_type: row.revenue_type,
            amount: row.amount,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
fn unique_conflict(e: sqlx::Error, what: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(what.to_string())
        }
        _ => RepositoryError::Database(e),
    }
}

// =============================================================================
// Store
// =============================================================================

/// Ledger store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn shipment_history(&self, id: ShipmentId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM shipment_history WHERE shipment_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn return_request(
        &self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, ReturnRequestRow>(&format!(
            "SELECT {RETURN_REQUEST_COLUMNS} FROM return_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, RepositoryError> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_kind = $1 AND owner_id = $2"
        ))
        .bind(owner.kind())
        .bind(owner.owner_id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE wallet_id = $1 ORDER BY id"
        ))
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn revenue_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<AdminRevenue>, RepositoryError> {
        let rows = sqlx::query_as::<_, RevenueRow>(&format!(
            "SELECT {REVENUE_COLUMNS} FROM admin_revenue WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn shipments_in_status_since(
        &self,
        status: ShipmentStatus,
        entered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShipmentId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, ShipmentId>(
            r"
            SELECT id FROM shipments
            WHERE status = $1 AND status_changed_at <= $2
            ORDER BY status_changed_at, id
            LIMIT $3
            ",
        )
        .bind(status)
        .bind(entered_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn shipments_missing_estimate(
        &self,
        limit: i64,
    ) -> Result<Vec<ShipmentId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, ShipmentId>(&format!(
            "SELECT id FROM shipments \
             WHERE status IN {IN_FLIGHT_STATUSES} AND expected_delivery_at IS NULL \
             ORDER BY id LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn payouts_due(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, OrderId>(
            r"
            SELECT o.id FROM orders o
            WHERE o.payout_status = 'PENDING' AND o.delivered_at <= $1
              AND NOT EXISTS (
                  SELECT 1 FROM return_requests r
                  WHERE r.order_id = o.id AND r.settled_at IS NULL
              )
            ORDER BY o.delivered_at, o.id
            LIMIT $2
            ",
        )
        .bind(delivered_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// One SQL transaction.
pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (buyer_id, store_id, payment_method, payment_status,
                                product_revenue, shipping_fee, platform_discount, amount_paid,
                                payment_ref, pickup_address, delivery_address,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.buyer_id)
        .bind(order.store_id)
        .bind(order.payment_method)
        .bind(order.payment_status)
        .bind(order.product_revenue)
        .bind(order.shipping_fee)
        .bind(order.platform_discount)
        .bind(order.amount_paid)
        .bind(order.payment_ref)
        .bind(Json(order.pickup_address))
        .bind(Json(order.delivery_address))
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, payment_status = $3, store_payout = $4, payout_status = $5,
                delivered_at = $6, updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.store_payout)
        .bind(order.payout_status)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, RepositoryError> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            r"
            INSERT INTO shipments (order_id, is_return_shipment, return_request_id, from_address,
                                   to_address, fee, expected_delivery_at, created_at,
                                   status_changed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
            RETURNING {SHIPMENT_COLUMNS}
            "
        ))
        .bind(shipment.order_id)
        .bind(shipment.is_return_shipment)
        .bind(shipment.return_request_id)
        .bind(Json(shipment.from_address))
        .bind(Json(shipment.to_address))
        .bind(shipment.fee)
        .bind(shipment.expected_delivery_at)
        .bind(shipment.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_conflict(e, "order already has an active shipment"))?;
        Ok(row.into())
    }

    async fn lock_shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn active_shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments \
             WHERE order_id = $1 AND status NOT IN ('DELIVERED', 'RETURNED')"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save_shipment(&mut self, shipment: &mut Shipment) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shipments
            SET status = $3, expected_delivery_at = $4, status_changed_at = $5,
                updated_at = $6, version = version + 1
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(shipment.id)
        .bind(shipment.version)
        .bind(shipment.status)
        .bind(shipment.expected_delivery_at)
        .bind(shipment.status_changed_at)
        .bind(shipment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "shipment {} was modified concurrently",
                shipment.id
            )));
        }
        shipment.version += 1;
        Ok(())
    }

    async fn append_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, RepositoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            r"
            INSERT INTO shipment_history (shipment_id, status, message, actor, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {HISTORY_COLUMNS}
            "
        ))
        .bind(entry.shipment_id)
        .bind(entry.status)
        .bind(entry.message)
        .bind(entry.actor.to_string())
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn insert_return_request(
        &mut self,
        request: NewReturnRequest,
    ) -> Result<ReturnRequest, RepositoryError> {
        let row = sqlx::query_as::<_, ReturnRequestRow>(&format!(
            r"
            INSERT INTO return_requests (order_id, buyer_id, store_id, reason, requires_return,
                                         created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {RETURN_REQUEST_COLUMNS}
            "
        ))
        .bind(request.order_id)
        .bind(request.buyer_id)
        .bind(request.store_id)
        .bind(request.reason)
        .bind(request.requires_return)
        .bind(request.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn lock_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, ReturnRequestRow>(&format!(
            "SELECT {RETURN_REQUEST_COLUMNS} FROM return_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn unsettled_return_request(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, ReturnRequestRow>(&format!(
            "SELECT {RETURN_REQUEST_COLUMNS} FROM return_requests \
             WHERE order_id = $1 AND settled_at IS NULL \
             ORDER BY id LIMIT 1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save_return_request(
        &mut self,
        request: &ReturnRequest,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE return_requests
            SET status = $2, resolution = $3, admin_note = $4, return_shipment_id = $5,
                settled_at = $6, updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.resolution.map(Json))
        .bind(request.admin_note.as_deref())
        .bind(request.return_shipment_id)
        .bind(request.settled_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn lock_or_create_wallet(
        &mut self,
        owner: WalletOwner,
        now: DateTime<Utc>,
    ) -> Result<Wallet, RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO wallets (owner_kind, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (owner_kind, owner_id) DO NOTHING
            ",
        )
        .bind(owner.kind())
        .bind(owner.owner_id())
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE owner_kind = $1 AND owner_id = $2 FOR UPDATE"
        ))
        .bind(owner.kind())
        .bind(owner.owner_id())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn save_wallet(&mut self, wallet: &mut Wallet) -> Result<(), RepositoryError> {
        let b = &wallet.balances;
        let result = sqlx::query(
            r"
            UPDATE wallets
            SET balance = $3, pending_amount = $4, total_earned = $5, total_refunded = $6,
                total_withdrawn = $7, total_spent = $8, updated_at = $9,
                version = version + 1
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(wallet.id)
        .bind(wallet.version)
        .bind(b.balance)
        .bind(b.pending_amount)
        .bind(b.total_earned)
        .bind(b.total_refunded)
        .bind(b.total_withdrawn)
        .bind(b.total_spent)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "wallet {} was modified concurrently",
                wallet.id
            )));
        }
        wallet.version += 1;
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r"
            INSERT INTO wallet_transactions (wallet_id, transaction_type, amount, pending_delta,
                                             balance_before, balance_after, description,
                                             order_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TRANSACTION_COLUMNS}
            "
        ))
        .bind(transaction.wallet_id)
        .bind(transaction.transaction_type)
        .bind(transaction.amount)
        .bind(transaction.pending_delta)
        .bind(transaction.balance_before)
        .bind(transaction.balance_after)
        .bind(transaction.description)
        .bind(transaction.order_id)
        .bind(transaction.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn insert_withdrawal(
        &mut self,
        request: NewWithdrawalRequest,
    ) -> Result<WithdrawalRequest, RepositoryError> {
        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            r"
            INSERT INTO withdrawal_requests (wallet_id, owner_kind, owner_id, amount, bank_name,
                                             account_number, account_holder, created_at,
                                             updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {WITHDRAWAL_COLUMNS}
            "
        ))
        .bind(request.wallet_id)
        .bind(request.owner.kind())
        .bind(request.owner.owner_id())
        .bind(request.amount)
        .bind(request.bank.bank_name)
        .bind(request.bank.account_number)
        .bind(request.bank.account_holder)
        .bind(request.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn lock_withdrawal(
        &mut self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError> {
        let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn has_open_withdrawal(&mut self, owner: WalletOwner) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM withdrawal_requests
                WHERE owner_kind = $1 AND owner_id = $2 AND status IN ('PENDING', 'APPROVED')
            )
            ",
        )
        .bind(owner.kind())
        .bind(owner.owner_id())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn save_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE withdrawal_requests
            SET status = $2, admin_note = $3, rejection_reason = $4,
                transaction_id = COALESCE(transaction_id, $5),
                processed_at = $6, updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.admin_note.as_deref())
        .bind(request.rejection_reason.as_deref())
        .bind(request.transaction_id)
        .bind(request.processed_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn insert_revenue(&mut self, revenue: NewAdminRevenue) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO admin_revenue (order_id, revenue_type, amount, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, revenue_type) DO NOTHING
            ",
        )
        .bind(revenue.order_id)
        .bind(revenue.revenue_type)
        .bind(revenue.amount)
        .bind(revenue.description)
        .bind(revenue.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
