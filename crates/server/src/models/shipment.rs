//! Shipment legs and their audit history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use parcel_ledger_core::shipment::Leg;
use parcel_ledger_core::{Address, OrderId, ReturnRequestId, ShipmentId, ShipmentStatus};

/// One physical fulfillment leg of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub status: ShipmentStatus,
    /// Reverse-logistics leg carrying delivered goods back to the store.
    pub is_return_shipment: bool,
    /// Return request a reverse leg was created for.
    pub return_request_id: Option<ReturnRequestId>,
    pub from_address: Address,
    pub to_address: Address,
    pub fee: Decimal,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// When the current status was entered. Sweeps age shipments by this.
    pub status_changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every save; a stale save is rejected.
    pub version: i64,
}

impl Shipment {
    #[must_use]
    pub const fn leg(&self) -> Leg {
        Leg::from_flag(self.is_return_shipment)
    }
}

/// Insert input for a new shipment. It always starts at `READY_TO_PICK`.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub order_id: OrderId,
    pub is_return_shipment: bool,
    pub return_request_id: Option<ReturnRequestId>,
    pub from_address: Address,
    pub to_address: Address,
    pub fee: Decimal,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Who caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Actor {
    Shipper(i64),
    Admin(i64),
    Scheduler,
    #[default]
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shipper(id) => write!(f, "shipper:{id}"),
            Self::Admin(id) => write!(f, "admin:{id}"),
            Self::Scheduler => write!(f, "scheduler"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some(("shipper", id)) => id
                .parse()
                .map(Self::Shipper)
                .map_err(|e| format!("invalid shipper id: {e}")),
            Some(("admin", id)) => id
                .parse()
                .map(Self::Admin)
                .map_err(|e| format!("invalid admin id: {e}")),
            None if s == "scheduler" => Ok(Self::Scheduler),
            None if s == "system" => Ok(Self::System),
            _ => Err(format!("invalid actor: {s}")),
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Actor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One audited step in a shipment's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub message: String,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub shipment_id: ShipmentId,
    pub status: ShipmentStatus,
    pub message: String,
    pub actor: Actor,
    pub created_at: DateTime<Utc>,
}
