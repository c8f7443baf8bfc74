//! Marketplace orders, as far as fulfillment and settlement see them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parcel_ledger_core::settlement::OrderFigures;
use parcel_ledger_core::{
    Address, OrderId, OrderStatus, PaymentMethod, PaymentStatus, PayoutStatus, StoreId, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Product subtotal the store sells at, before shipping.
    pub product_revenue: Decimal,
    pub shipping_fee: Decimal,
    /// Discount funded by the platform rather than the store.
    pub platform_discount: Decimal,
    /// What the buyer actually paid (pre-paid orders).
    pub amount_paid: Decimal,
    /// Gateway reference of the captured payment.
    pub payment_ref: Option<String>,
    pub pickup_address: Address,
    pub delivery_address: Address,
    /// Set at delivery.
    pub store_payout: Option<Decimal>,
    pub payout_status: PayoutStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Figures a dispute settlement is computed from.
    #[must_use]
    pub fn figures(&self) -> OrderFigures {
        OrderFigures {
            product_revenue: self.product_revenue,
            shipping_fee: self.shipping_fee,
            store_payout: self.store_payout.unwrap_or_default(),
            payout_status: self.payout_status,
        }
    }
}

/// Insert input for an order placed elsewhere in the marketplace.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: UserId,
    pub store_id: StoreId,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub product_revenue: Decimal,
    pub shipping_fee: Decimal,
    pub platform_discount: Decimal,
    pub amount_paid: Decimal,
    pub payment_ref: Option<String>,
    pub pickup_address: Address,
    pub delivery_address: Address,
    pub created_at: DateTime<Utc>,
}
