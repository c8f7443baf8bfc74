//! Postal address snapshots.

use serde::{Deserialize, Serialize};

/// A pickup or delivery address as it was when the shipment was created.
///
/// Shipments keep their own copy so later edits to a buyer's or store's
/// address book never rewrite where a parcel actually went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Recipient or sender name.
    pub contact_name: String,
    /// Contact phone number.
    pub phone: String,
    /// Street line.
    pub street: String,
    /// District or ward.
    pub district: String,
    /// Province or region; the delivery estimator keys on this.
    pub region: String,
}

impl Address {
    /// Case-insensitive comparison of the region component.
    #[must_use]
    pub fn same_region(&self, other: &Self) -> bool {
        self.region.trim().eq_ignore_ascii_case(other.region.trim())
    }
}
