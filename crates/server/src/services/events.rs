//! Domain events raised inside a unit of work.
//!
//! Services collect events while they mutate state and hand them to the
//! [`Notifier`](super::notifications::Notifier) only after the unit commits,
//! so a rolled-back change never produces an alert.

use rust_decimal::Decimal;
use serde::Serialize;

use parcel_ledger_core::ledger::WalletOwner;
use parcel_ledger_core::settlement::DisputeResolution;
use parcel_ledger_core::{
    OrderId, ReturnRequestId, ShipmentId, ShipmentStatus, StoreId, UserId, WithdrawalRequestId,
    WithdrawalStatus,
};

use super::notifications::{Notification, NotifyTarget};
use crate::models::Actor;

/// How a buyer refund reached the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundChannel {
    Gateway,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ShipmentTransitioned {
        shipment_id: ShipmentId,
        order_id: OrderId,
        buyer_id: UserId,
        store_id: StoreId,
        from: ShipmentStatus,
        to: ShipmentStatus,
        is_return_shipment: bool,
        actor: Actor,
    },
    WithdrawalRequested {
        request_id: WithdrawalRequestId,
        owner: WalletOwner,
        amount: Decimal,
    },
    WithdrawalDecided {
        request_id: WithdrawalRequestId,
        owner: WalletOwner,
        amount: Decimal,
        status: WithdrawalStatus,
        reason: Option<String>,
    },
    ReturnRequestResolved {
        request_id: ReturnRequestId,
        order_id: OrderId,
        buyer_id: UserId,
        store_id: StoreId,
        resolution: DisputeResolution,
    },
    RefundIssued {
        order_id: OrderId,
        buyer_id: UserId,
        amount: Decimal,
        channel: RefundChannel,
    },
    PayoutReleased {
        order_id: OrderId,
        store_id: StoreId,
        amount: Decimal,
    },
}

const fn owner_target(owner: WalletOwner) -> NotifyTarget {
    match owner {
        WalletOwner::Store(id) => NotifyTarget::Store(id),
        WalletOwner::Buyer(id) => NotifyTarget::User(id),
    }
}

impl DomainEvent {
    /// Notifications this event implies.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        match self {
            Self::ShipmentTransitioned {
                shipment_id,
                order_id,
                buyer_id,
                store_id,
                to,
                ..
            } => {
                let title = format!("Order {order_id} shipment update");
                let body = format!("Shipment {shipment_id} is now {to}");
                vec![
                    Notification {
                        target: NotifyTarget::User(*buyer_id),
                        title: title.clone(),
                        body: body.clone(),
                        related_id: Some(shipment_id.as_i64()),
                    },
                    Notification {
                        target: NotifyTarget::Store(*store_id),
                        title,
                        body,
                        related_id: Some(shipment_id.as_i64()),
                    },
                ]
            }
            Self::WithdrawalRequested {
                request_id,
                owner,
                amount,
            } => vec![Notification {
                target: NotifyTarget::Admin,
                title: "New withdrawal request".to_string(),
                body: format!("{owner} requested a withdrawal of {amount}"),
                related_id: Some(request_id.as_i64()),
            }],
            Self::WithdrawalDecided {
                request_id,
                owner,
                amount,
                status,
                reason,
            } => {
                let body = match reason {
                    Some(reason) => format!("Withdrawal of {amount} is {status}: {reason}"),
                    None => format!("Withdrawal of {amount} is {status}"),
                };
                vec![Notification {
                    target: owner_target(*owner),
                    title: "Withdrawal request updated".to_string(),
                    body,
                    related_id: Some(request_id.as_i64()),
                }]
            }
            Self::ReturnRequestResolved {
                request_id,
                order_id,
                buyer_id,
                store_id,
                resolution,
            } => {
                let outcome = match resolution {
                    DisputeResolution::FullRefund => "approved with a full refund".to_string(),
                    DisputeResolution::PartialRefund { buyer_amount } => {
                        format!("approved with a partial refund of {buyer_amount}")
                    }
                    DisputeResolution::Rejected => "rejected".to_string(),
                };
                let body = format!("Return request for order {order_id} was {outcome}");
                vec![
                    Notification {
                        target: NotifyTarget::User(*buyer_id),
                        title: "Return request resolved".to_string(),
                        body: body.clone(),
                        related_id: Some(request_id.as_i64()),
                    },
                    Notification {
                        target: NotifyTarget::Store(*store_id),
                        title: "Return request resolved".to_string(),
                        body,
                        related_id: Some(request_id.as_i64()),
                    },
                ]
            }
            Self::RefundIssued {
                order_id,
                buyer_id,
                amount,
                channel,
            } => {
                let body = match channel {
                    RefundChannel::Gateway => {
                        format!("{amount} for order {order_id} was refunded to your payment method")
                    }
                    RefundChannel::Wallet => {
                        format!("{amount} for order {order_id} was credited to your wallet")
                    }
                };
                vec![Notification {
                    target: NotifyTarget::User(*buyer_id),
                    title: "Refund issued".to_string(),
                    body,
                    related_id: Some(order_id.as_i64()),
                }]
            }
            Self::PayoutReleased {
                order_id,
                store_id,
                amount,
            } => vec![Notification {
                target: NotifyTarget::Store(*store_id),
                title: "Payout released".to_string(),
                body: format!("{amount} for order {order_id} is now available to withdraw"),
                related_id: Some(order_id.as_i64()),
            }],
        }
    }
}
