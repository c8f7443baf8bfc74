//! Platform revenue rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parcel_ledger_core::{AdminRevenueId, OrderId, RevenueType};

/// One platform-side revenue line. At most one per `(order_id, revenue_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRevenue {
    pub id: AdminRevenueId,
    pub order_id: OrderId,
    pub revenue_type: RevenueType,
    /// Negative for losses.
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdminRevenue {
    pub order_id: OrderId,
    pub revenue_type: RevenueType,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
