//! In-memory ledger store.
//!
//! A unit of work takes the store's lock for its whole lifetime and edits a
//! private copy of the state; `commit` swaps the copy in. Units are therefore
//! fully serialized, which gives the same observable guarantees as row locks
//! without any lock ordering concerns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use parcel_ledger_core::ledger::{WalletBalances, WalletOwner};
use parcel_ledger_core::{
    AdminRevenueId, OrderId, OrderStatus, PayoutStatus, ReturnRequestId, ReturnRequestStatus,
    ShipmentId, ShipmentStatus, TransactionId, WalletId, WithdrawalRequestId, WithdrawalStatus,
};

use super::{LedgerStore, RepositoryError, UnitOfWork};
use crate::models::{
    AdminRevenue, HistoryEntry, NewAdminRevenue, NewHistoryEntry, NewOrder, NewReturnRequest,
    NewShipment, NewTransaction, NewWithdrawalRequest, Order, ReturnRequest, Shipment,
    Transaction, Wallet, WithdrawalRequest,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    orders: BTreeMap<OrderId, Order>,
    shipments: BTreeMap<ShipmentId, Shipment>,
    history: Vec<HistoryEntry>,
    return_requests: BTreeMap<ReturnRequestId, ReturnRequest>,
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: Vec<Transaction>,
    withdrawals: BTreeMap<WithdrawalRequestId, WithdrawalRequest>,
    revenue: Vec<AdminRevenue>,
}

impl MemoryState {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn wallet_by_owner(&self, owner: WalletOwner) -> Option<&Wallet> {
        self.wallets.values().find(|w| w.owner == owner)
    }
}

/// Ledger store held entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self.state.lock().await.shipments.get(&id).cloned())
    }

    async fn shipment_history(&self, id: ShipmentId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.shipment_id == id)
            .cloned()
            .collect())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn return_request(
        &self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        Ok(self.state.lock().await.return_requests.get(&id).cloned())
    }

    async fn wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, RepositoryError> {
        Ok(self.state.lock().await.wallet_by_owner(owner).cloned())
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn withdrawal(
        &self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError> {
        Ok(self.state.lock().await.withdrawals.get(&id).cloned())
    }

    async fn revenue_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<AdminRevenue>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .revenue
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn shipments_in_status_since(
        &self,
        status: ShipmentStatus,
        entered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ShipmentId>, RepositoryError> {
        let state = self.state.lock().await;
        let mut matched: Vec<&Shipment> = state
            .shipments
            .values()
            .filter(|s| s.status == status && s.status_changed_at <= entered_before)
            .collect();
        matched.sort_by_key(|s| (s.status_changed_at, s.id));
        Ok(matched
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|s| s.id)
            .collect())
    }

    async fn shipments_missing_estimate(
        &self,
        limit: i64,
    ) -> Result<Vec<ShipmentId>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .values()
            .filter(|s| s.status.is_in_flight() && s.expected_delivery_at.is_none())
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|s| s.id)
            .collect())
    }

    async fn payouts_due(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderId>, RepositoryError> {
        let state = self.state.lock().await;
        let mut due: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| {
                o.payout_status == PayoutStatus::Pending
                    && o.delivered_at.is_some_and(|at| at <= delivered_before)
                    && !state
                        .return_requests
                        .values()
                        .any(|r| r.order_id == o.id && !r.is_settled())
            })
            .collect();
        due.sort_by_key(|o| (o.delivered_at, o.id));
        Ok(due
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|o| o.id)
            .collect())
    }
}

/// Unit of work over a [`MemoryStore`].
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn stale(kind: &str, id: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Conflict(format!("{kind} {id} was modified concurrently"))
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        let id = OrderId::new(self.working.next_id());
        let order = Order {
            id,
            buyer_id: order.buyer_id,
            store_id: order.store_id,
            status: OrderStatus::Pending,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            product_revenue: order.product_revenue,
            shipping_fee: order.shipping_fee,
            platform_discount: order.platform_discount,
            amount_paid: order.amount_paid,
            payment_ref: order.payment_ref,
            pickup_address: order.pickup_address,
            delivery_address: order.delivery_address,
            store_payout: None,
            payout_status: PayoutStatus::Unscheduled,
            delivered_at: None,
            created_at: order.created_at,
            updated_at: order.created_at,
        };
        self.working.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = order.clone();
        Ok(())
    }

    async fn insert_shipment(&mut self, shipment: NewShipment) -> Result<Shipment, RepositoryError> {
        let id = ShipmentId::new(self.working.next_id());
        let shipment = Shipment {
            id,
            order_id: shipment.order_id,
            status: ShipmentStatus::ReadyToPick,
            is_return_shipment: shipment.is_return_shipment,
            return_request_id: shipment.return_request_id,
            from_address: shipment.from_address,
            to_address: shipment.to_address,
            fee: shipment.fee,
            expected_delivery_at: shipment.expected_delivery_at,
            created_at: shipment.created_at,
            status_changed_at: shipment.created_at,
            updated_at: shipment.created_at,
            version: 1,
        };
        self.working.shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn lock_shipment(&mut self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self.working.shipments.get(&id).cloned())
    }

    async fn active_shipment_for_order(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self
            .working
            .shipments
            .values()
            .find(|s| s.order_id == order_id && !s.status.is_terminal())
            .cloned())
    }

    async fn save_shipment(&mut self, shipment: &mut Shipment) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .shipments
            .get_mut(&shipment.id)
            .ok_or(RepositoryError::NotFound)?;
        if slot.version != shipment.version {
            return Err(stale("shipment", shipment.id));
        }
        shipment.version += 1;
        *slot = shipment.clone();
        Ok(())
    }

    async fn append_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, RepositoryError> {
        let entry = HistoryEntry {
            id: self.working.next_id(),
            shipment_id: entry.shipment_id,
            status: entry.status,
            message: entry.message,
            actor: entry.actor,
            created_at: entry.created_at,
        };
        self.working.history.push(entry.clone());
        Ok(entry)
    }

    async fn insert_return_request(
        &mut self,
        request: NewReturnRequest,
    ) -> Result<ReturnRequest, RepositoryError> {
        let id = ReturnRequestId::new(self.working.next_id());
        let request = ReturnRequest {
            id,
            order_id: request.order_id,
            buyer_id: request.buyer_id,
            store_id: request.store_id,
            status: ReturnRequestStatus::Requested,
            reason: request.reason,
            requires_return: request.requires_return,
            resolution: None,
            admin_note: None,
            return_shipment_id: None,
            settled_at: None,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        self.working.return_requests.insert(id, request.clone());
        Ok(request)
    }

    async fn lock_return_request(
        &mut self,
        id: ReturnRequestId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        Ok(self.working.return_requests.get(&id).cloned())
    }

    async fn unsettled_return_request(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        Ok(self
            .working
            .return_requests
            .values()
            .find(|r| r.order_id == order_id && !r.is_settled())
            .cloned())
    }

    async fn save_return_request(
        &mut self,
        request: &ReturnRequest,
    ) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .return_requests
            .get_mut(&request.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = request.clone();
        Ok(())
    }

    async fn lock_or_create_wallet(
        &mut self,
        owner: WalletOwner,
        now: DateTime<Utc>,
    ) -> Result<Wallet, RepositoryError> {
        if let Some(wallet) = self.working.wallet_by_owner(owner) {
            return Ok(wallet.clone());
        }
        let id = WalletId::new(self.working.next_id());
        let wallet = Wallet {
            id,
            owner,
            balances: WalletBalances::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.working.wallets.insert(id, wallet.clone());
        Ok(wallet)
    }

    async fn save_wallet(&mut self, wallet: &mut Wallet) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .wallets
            .get_mut(&wallet.id)
            .ok_or(RepositoryError::NotFound)?;
        if slot.version != wallet.version {
            return Err(stale("wallet", wallet.id));
        }
        wallet.version += 1;
        *slot = wallet.clone();
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewTransaction,
    ) -> Result<Transaction, RepositoryError> {
        let transaction = Transaction {
            id: TransactionId::new(self.working.next_id()),
            wallet_id: transaction.wallet_id,
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            pending_delta: transaction.pending_delta,
            balance_before: transaction.balance_before,
            balance_after: transaction.balance_after,
            description: transaction.description,
            order_id: transaction.order_id,
            created_at: transaction.created_at,
        };
        self.working.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn insert_withdrawal(
        &mut self,
        request: NewWithdrawalRequest,
    ) -> Result<WithdrawalRequest, RepositoryError> {
        let id = WithdrawalRequestId::new(self.working.next_id());
        let request = WithdrawalRequest {
            id,
            wallet_id: request.wallet_id,
            owner: request.owner,
            amount: request.amount,
            bank: request.bank,
            status: WithdrawalStatus::Pending,
            admin_note: None,
            rejection_reason: None,
            transaction_id: None,
            processed_at: None,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        self.working.withdrawals.insert(id, request.clone());
        Ok(request)
    }

    async fn lock_withdrawal(
        &mut self,
        id: WithdrawalRequestId,
    ) -> Result<Option<WithdrawalRequest>, RepositoryError> {
        Ok(self.working.withdrawals.get(&id).cloned())
    }

    async fn has_open_withdrawal(&mut self, owner: WalletOwner) -> Result<bool, RepositoryError> {
        Ok(self
            .working
            .withdrawals
            .values()
            .any(|w| w.owner == owner && w.status.is_open()))
    }

    async fn save_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
    ) -> Result<(), RepositoryError> {
        let slot = self
            .working
            .withdrawals
            .get_mut(&request.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = request.clone();
        Ok(())
    }

    async fn insert_revenue(&mut self, revenue: NewAdminRevenue) -> Result<bool, RepositoryError> {
        let exists = self
            .working
            .revenue
            .iter()
            .any(|r| r.order_id == revenue.order_id && r.revenue_type == revenue.revenue_type);
        if exists {
            return Ok(false);
        }
        let row = AdminRevenue {
            id: AdminRevenueId::new(self.working.next_id()),
            order_id: revenue.order_id,
            revenue_type: revenue.revenue_type,
            amount: revenue.amount,
            description: revenue.description,
            created_at: revenue.created_at,
        };
        self.working.revenue.push(row);
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parcel_ledger_core::{RevenueType, StoreId};
    use rust_decimal::Decimal;

    fn owner() -> WalletOwner {
        WalletOwner::Store(StoreId::new(1))
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_or_create_wallet(owner(), Utc::now()).await.unwrap();
        }
        assert!(store.wallet(owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let created = uow.lock_or_create_wallet(owner(), Utc::now()).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(store.wallet(owner()).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_wallet_created_once_per_owner() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let first = uow.lock_or_create_wallet(owner(), Utc::now()).await.unwrap();
        let second = uow.lock_or_create_wallet(owner(), Utc::now()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_stale_wallet_save_conflicts() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut wallet = uow.lock_or_create_wallet(owner(), Utc::now()).await.unwrap();
        let mut stale_copy = wallet.clone();
        uow.save_wallet(&mut wallet).await.unwrap();
        assert_eq!(wallet.version, 2);
        assert!(matches!(
            uow.save_wallet(&mut stale_copy).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_revenue_insert_if_absent() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let row = NewAdminRevenue {
            order_id: OrderId::new(9),
            revenue_type: RevenueType::ServiceFee,
            amount: Decimal::new(100, 0),
            description: "fee".to_string(),
            created_at: Utc::now(),
        };
        assert!(uow.insert_revenue(row.clone()).await.unwrap());
        assert!(!uow.insert_revenue(row).await.unwrap());
        uow.commit().await.unwrap();
        assert_eq!(store.revenue_for_order(OrderId::new(9)).await.unwrap().len(), 1);
    }
}
