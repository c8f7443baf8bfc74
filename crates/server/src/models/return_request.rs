//! Buyer return requests and their adjudication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parcel_ledger_core::settlement::DisputeResolution;
use parcel_ledger_core::{OrderId, ReturnRequestId, ReturnRequestStatus, ShipmentId, StoreId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: ReturnRequestId,
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub status: ReturnRequestStatus,
    pub reason: String,
    /// Goods must travel back before a full refund is paid.
    pub requires_return: bool,
    pub resolution: Option<DisputeResolution>,
    pub admin_note: Option<String>,
    pub return_shipment_id: Option<ShipmentId>,
    /// When the resolution's money directive was applied. Set once.
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewReturnRequest {
    pub order_id: OrderId,
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub reason: String,
    pub requires_return: bool,
    pub created_at: DateTime<Utc>,
}
