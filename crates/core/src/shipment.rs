//! Shipment transition table.
//!
//! A shipment leg is either a forward delivery or a return (reverse
//! logistics). Both start at `READY_TO_PICK`; they diverge after `PICKED`:
//!
//! ```text
//! forward: READY_TO_PICK -> PICKING -> PICKED -> SHIPPING -> DELIVERED
//!                                                         \-> DELIVERED_FAIL -> RETURNING -> RETURNED
//! return:  READY_TO_PICK -> PICKING -> PICKED -> RETURNING -> RETURNED
//! ```
//!
//! Every action names exactly one predecessor status. Anything else is an
//! [`TransitionError::InvalidStateTransition`] and leaves the shipment
//! untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OrderStatus, ShipmentStatus};

/// A shipper, admin, or scheduler action on a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShipmentAction {
    PickingUp,
    PickedUp,
    StartShipping,
    Deliver,
    DeliverFail,
    StartReturning,
    CompleteReturn,
}

impl ShipmentAction {
    /// Every action.
    pub const ALL: [Self; 7] = [
        Self::PickingUp,
        Self::PickedUp,
        Self::StartShipping,
        Self::Deliver,
        Self::DeliverFail,
        Self::StartReturning,
        Self::CompleteReturn,
    ];

    /// Kebab-case name used in URLs and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PickingUp => "picking-up",
            Self::PickedUp => "picked-up",
            Self::StartShipping => "start-shipping",
            Self::Deliver => "deliver",
            Self::DeliverFail => "deliver-fail",
            Self::StartReturning => "start-returning",
            Self::CompleteReturn => "complete-return",
        }
    }

    /// Human-readable history line for a successful transition.
    #[must_use]
    pub const fn history_message(&self) -> &'static str {
        match self {
            Self::PickingUp => "Carrier is picking up the parcel",
            Self::PickedUp => "Parcel picked up",
            Self::StartShipping => "Parcel in transit",
            Self::Deliver => "Parcel delivered",
            Self::DeliverFail => "Delivery attempt failed",
            Self::StartReturning => "Parcel returning to sender",
            Self::CompleteReturn => "Parcel returned to sender",
        }
    }
}

impl std::fmt::Display for ShipmentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("invalid shipment action: {s}"))
    }
}

/// Which transition set applies to a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Forward,
    Return,
}

impl Leg {
    /// Leg for a shipment's `is_return_shipment` flag.
    #[must_use]
    pub const fn from_flag(is_return_shipment: bool) -> Self {
        if is_return_shipment {
            Self::Return
        } else {
            Self::Forward
        }
    }
}

/// A rejected shipment transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The current status is not the action's predecessor.
    #[error("cannot {action} a shipment in status {from}")]
    InvalidStateTransition {
        /// Status the shipment is in.
        from: ShipmentStatus,
        /// Action that was attempted.
        action: ShipmentAction,
    },
    /// Return legs are never allowed into `SHIPPING`.
    #[error("return shipments cannot enter SHIPPING")]
    ReturnShipmentCannotShip,
}

/// Predecessor status an action requires, and the status it produces.
///
/// `None` means the action does not exist on this leg at all.
#[must_use]
pub const fn edge(action: ShipmentAction, leg: Leg) -> Option<(ShipmentStatus, ShipmentStatus)> {
    use ShipmentStatus as S;

    match (action, leg) {
        (ShipmentAction::PickingUp, _) => Some((S::ReadyToPick, S::Picking)),
        (ShipmentAction::PickedUp, _) => Some((S::Picking, S::Picked)),
        (ShipmentAction::StartShipping, Leg::Forward) => Some((S::Picked, S::Shipping)),
        (ShipmentAction::Deliver, Leg::Forward) => Some((S::Shipping, S::Delivered)),
        (ShipmentAction::DeliverFail, Leg::Forward) => Some((S::Shipping, S::DeliveredFail)),
        (ShipmentAction::StartReturning, Leg::Forward) => Some((S::DeliveredFail, S::Returning)),
        (ShipmentAction::StartReturning, Leg::Return) => Some((S::Picked, S::Returning)),
        (ShipmentAction::CompleteReturn, _) => Some((S::Returning, S::Returned)),
        (
            ShipmentAction::StartShipping | ShipmentAction::Deliver | ShipmentAction::DeliverFail,
            Leg::Return,
        ) => None,
    }
}

/// Compute the status an action moves a shipment to.
///
/// # Errors
///
/// Returns `TransitionError::ReturnShipmentCannotShip` for any return-leg
/// action that would enter `SHIPPING`, and
/// `TransitionError::InvalidStateTransition` when `current` is not the
/// action's predecessor.
pub fn next_status(
    current: ShipmentStatus,
    action: ShipmentAction,
    leg: Leg,
) -> Result<ShipmentStatus, TransitionError> {
    if leg == Leg::Return && action == ShipmentAction::StartShipping {
        return Err(TransitionError::ReturnShipmentCannotShip);
    }

    match edge(action, leg) {
        Some((from, to)) if from == current => Ok(to),
        _ => Err(TransitionError::InvalidStateTransition {
            from: current,
            action,
        }),
    }
}

/// Order status implied by a shipment entering `status`.
///
/// `None` leaves the order untouched. Return legs only move the order once
/// goods are travelling back.
#[must_use]
pub const fn order_status_for(status: ShipmentStatus, leg: Leg) -> Option<OrderStatus> {
    match (leg, status) {
        (Leg::Forward, ShipmentStatus::ReadyToPick) => Some(OrderStatus::Confirmed),
        (Leg::Forward, ShipmentStatus::Picking | ShipmentStatus::Picked) => {
            Some(OrderStatus::Processing)
        }
        (Leg::Forward, ShipmentStatus::Shipping) => Some(OrderStatus::Shipping),
        (Leg::Forward, ShipmentStatus::Delivered) => Some(OrderStatus::Delivered),
        (Leg::Forward, ShipmentStatus::DeliveredFail) => Some(OrderStatus::DeliveryFailed),
        (_, ShipmentStatus::Returning) => Some(OrderStatus::Returning),
        (Leg::Forward, ShipmentStatus::Returned) => Some(OrderStatus::Cancelled),
        (Leg::Return, ShipmentStatus::Returned) => Some(OrderStatus::Returned),
        (
            Leg::Return,
            ShipmentStatus::ReadyToPick
            | ShipmentStatus::Picking
            | ShipmentStatus::Picked
            | ShipmentStatus::Shipping
            | ShipmentStatus::Delivered
            | ShipmentStatus::DeliveredFail,
        ) => None,
    }
}

/// Actions the delivery driver takes to move a stalled `PICKING` shipment on.
///
/// Forward legs end up in `SHIPPING`, return legs in `RETURNING`.
#[must_use]
pub const fn auto_advance_from_picking(leg: Leg) -> [ShipmentAction; 2] {
    match leg {
        Leg::Forward => [ShipmentAction::PickedUp, ShipmentAction::StartShipping],
        Leg::Return => [ShipmentAction::PickedUp, ShipmentAction::StartReturning],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LEGS: [Leg; 2] = [Leg::Forward, Leg::Return];

    #[test]
    fn test_forward_happy_path() {
        let mut status = ShipmentStatus::ReadyToPick;
        for action in [
            ShipmentAction::PickingUp,
            ShipmentAction::PickedUp,
            ShipmentAction::StartShipping,
            ShipmentAction::Deliver,
        ] {
            status = next_status(status, action, Leg::Forward).expect("valid transition");
        }
        assert_eq!(status, ShipmentStatus::Delivered);
    }

    #[test]
    fn test_forward_failed_delivery_returns() {
        let mut status = ShipmentStatus::Shipping;
        for action in [
            ShipmentAction::DeliverFail,
            ShipmentAction::StartReturning,
            ShipmentAction::CompleteReturn,
        ] {
            status = next_status(status, action, Leg::Forward).expect("valid transition");
        }
        assert_eq!(status, ShipmentStatus::Returned);
        assert_eq!(
            order_status_for(status, Leg::Forward),
            Some(OrderStatus::Cancelled)
        );
    }

    #[test]
    fn test_return_leg_path() {
        let mut status = ShipmentStatus::ReadyToPick;
        for action in [
            ShipmentAction::PickingUp,
            ShipmentAction::PickedUp,
            ShipmentAction::StartReturning,
            ShipmentAction::CompleteReturn,
        ] {
            status = next_status(status, action, Leg::Return).expect("valid transition");
        }
        assert_eq!(status, ShipmentStatus::Returned);
        assert_eq!(
            order_status_for(status, Leg::Return),
            Some(OrderStatus::Returned)
        );
    }

    /// Every (state, action, leg) triple has exactly one outcome: the table's
    /// successor when the state matches the predecessor, an error otherwise.
    #[test]
    fn test_every_pair_has_one_outcome() {
        for leg in LEGS {
            for status in ShipmentStatus::ALL {
                for action in ShipmentAction::ALL {
                    let result = next_status(status, action, leg);
                    match edge(action, leg) {
                        Some((from, to)) if from == status => assert_eq!(result, Ok(to)),
                        _ => assert!(
                            result.is_err(),
                            "{status} + {action} on {leg:?} should be rejected"
                        ),
                    }
                }
            }
        }
    }

    #[test]
    fn test_return_leg_never_reaches_shipping() {
        for status in ShipmentStatus::ALL {
            for action in ShipmentAction::ALL {
                assert_ne!(
                    next_status(status, action, Leg::Return).ok(),
                    Some(ShipmentStatus::Shipping)
                );
            }
        }
        assert_eq!(
            next_status(ShipmentStatus::Picked, ShipmentAction::StartShipping, Leg::Return),
            Err(TransitionError::ReturnShipmentCannotShip)
        );
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for leg in LEGS {
            for status in [ShipmentStatus::Delivered, ShipmentStatus::Returned] {
                for action in ShipmentAction::ALL {
                    assert!(next_status(status, action, leg).is_err());
                }
            }
        }
    }

    #[test]
    fn test_invalid_transition_names_state_and_action() {
        let err = next_status(
            ShipmentStatus::Picking,
            ShipmentAction::PickingUp,
            Leg::Forward,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cannot picking-up a shipment in status PICKING");
    }

    #[test]
    fn test_action_parses_from_path_segment() {
        for action in ShipmentAction::ALL {
            assert_eq!(action.as_str().parse::<ShipmentAction>(), Ok(action));
        }
        assert!("teleport".parse::<ShipmentAction>().is_err());
    }

    #[test]
    fn test_auto_advance_targets() {
        for leg in LEGS {
            let mut status = ShipmentStatus::Picking;
            for action in auto_advance_from_picking(leg) {
                status = next_status(status, action, leg).expect("valid transition");
            }
            let expected = match leg {
                Leg::Forward => ShipmentStatus::Shipping,
                Leg::Return => ShipmentStatus::Returning,
            };
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_return_leg_does_not_touch_order_before_returning() {
        for status in [
            ShipmentStatus::ReadyToPick,
            ShipmentStatus::Picking,
            ShipmentStatus::Picked,
        ] {
            assert_eq!(order_status_for(status, Leg::Return), None);
        }
    }
}
