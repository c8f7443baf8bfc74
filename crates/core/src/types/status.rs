//! Closed status enumerations for every aggregate.
//!
//! Each enum has one canonical upper-case spelling used for serialization,
//! the Postgres enum type, and log output. Parsing is case-insensitive and
//! accepts `-` for `_`, so `picked-up` style path segments round-trip.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A status string did not name any member of the enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct UnknownStatus {
    /// Enum being parsed.
    pub kind: &'static str,
    /// Offending input.
    pub value: String,
}

macro_rules! status_strings {
    ($ty:ident { $($variant:ident => $canonical:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            /// Canonical upper-case name, as stored and serialized.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $canonical),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
                match normalized.as_str() {
                    $($canonical $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(UnknownStatus {
                        kind: stringify!($ty),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

/// Fulfillment status of a shipment leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shipment_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    ReadyToPick,
    Picking,
    Picked,
    Shipping,
    Delivered,
    DeliveredFail,
    Returning,
    Returned,
}

// `PICKING_UP` is the legacy spelling some persisted rows and sweep queries
// used for `PICKING`; it is accepted on input and never produced.
status_strings!(ShipmentStatus {
    ReadyToPick => "READY_TO_PICK",
    Picking => "PICKING" | "PICKING_UP",
    Picked => "PICKED",
    Shipping => "SHIPPING",
    Delivered => "DELIVERED",
    DeliveredFail => "DELIVERED_FAIL",
    Returning => "RETURNING",
    Returned => "RETURNED",
});

impl ShipmentStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::ReadyToPick,
        Self::Picking,
        Self::Picked,
        Self::Shipping,
        Self::Delivered,
        Self::DeliveredFail,
        Self::Returning,
        Self::Returned,
    ];

    /// No further transition is possible from this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Returned)
    }

    /// Goods are somewhere between the sender and the receiver.
    ///
    /// These are the shipments for which an expected delivery date matters.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::ReadyToPick | Self::Picking | Self::Picked | Self::Shipping | Self::Returning
        )
    }
}

/// Lifecycle status of a marketplace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipping,
    Delivered,
    DeliveryFailed,
    Returning,
    Returned,
    Cancelled,
    Completed,
}

status_strings!(OrderStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Processing => "PROCESSING",
    Shipping => "SHIPPING",
    Delivered => "DELIVERED",
    DeliveryFailed => "DELIVERY_FAILED",
    Returning => "RETURNING",
    Returned => "RETURNED",
    Cancelled => "CANCELLED",
    Completed => "COMPLETED",
});

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Collect on delivery: the carrier collects cash at the door.
    Cod,
    /// Captured through the payment gateway before fulfillment.
    Prepaid,
}

status_strings!(PaymentMethod {
    Cod => "COD",
    Prepaid => "PREPAID",
});

/// Whether the buyer's money has been received or returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
    PartiallyRefunded,
}

status_strings!(PaymentStatus {
    Unpaid => "UNPAID",
    Paid => "PAID",
    Refunded => "REFUNDED",
    PartiallyRefunded => "PARTIALLY_REFUNDED",
});

/// Where the store's share of an order sits in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payout_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    /// Nothing has been staged for the store yet.
    #[default]
    Unscheduled,
    /// Staged in the store's pending amount.
    Pending,
    /// Matured into the store's withdrawable balance.
    Released,
    /// Taken back from the store by a refund.
    Reversed,
}

status_strings!(PayoutStatus {
    Unscheduled => "UNSCHEDULED",
    Pending => "PENDING",
    Released => "RELEASED",
    Reversed => "REVERSED",
});

/// Adjudication status of a buyer's return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "return_request_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnRequestStatus {
    #[default]
    Requested,
    Approved,
    Rejected,
    Returned,
}

status_strings!(ReturnRequestStatus {
    Requested => "REQUESTED",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Returned => "RETURNED",
});

/// Status of a withdrawal request. Transition rules live in
/// [`crate::withdrawal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "withdrawal_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

status_strings!(WithdrawalStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Completed => "COMPLETED",
});

impl WithdrawalStatus {
    /// The request still awaits an admin decision.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

/// Platform-side revenue categories written by the revenue recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "revenue_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueType {
    /// Commission withheld from the store's product revenue.
    ServiceFee,
    /// Discount funded by the platform rather than the store.
    PlatformDiscountLoss,
    /// Shipping fee passed through the platform.
    ShippingFee,
    /// Refunded money the store had never been credited, mostly the
    /// commission. Negative.
    DisputeRefundShare,
}

status_strings!(RevenueType {
    ServiceFee => "SERVICE_FEE" | "PLATFORM_COMMISSION",
    PlatformDiscountLoss => "PLATFORM_DISCOUNT_LOSS",
    ShippingFee => "SHIPPING_FEE",
    DisputeRefundShare => "DISPUTE_REFUND_SHARE",
});
