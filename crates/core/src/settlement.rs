//! Return dispute settlement.
//!
//! An adjudicated return request produces one [`Directive`]: what the buyer
//! gets back and which postings hit the store's wallet. Services apply the
//! directive once, inside the same unit of work that stamps the request's
//! `settled_at`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerError, Posting};
use crate::types::{PaymentStatus, PayoutStatus, ReturnRequestStatus};

/// Outcome of a return dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeResolution {
    /// Buyer gets product and shipping back.
    FullRefund,
    /// Buyer gets `buyer_amount`; the store keeps the rest of its payout.
    PartialRefund { buyer_amount: Decimal },
    /// No money moves.
    Rejected,
}

impl DisputeResolution {
    /// Request status once this resolution is recorded.
    #[must_use]
    pub const fn request_status(&self) -> ReturnRequestStatus {
        match self {
            Self::FullRefund | Self::PartialRefund { .. } => ReturnRequestStatus::Approved,
            Self::Rejected => ReturnRequestStatus::Rejected,
        }
    }

    /// Money waits for the goods when they must travel back first.
    #[must_use]
    pub const fn is_deferred(&self, requires_return: bool) -> bool {
        requires_return && matches!(self, Self::FullRefund)
    }
}

/// Order figures a settlement is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFigures {
    pub product_revenue: Decimal,
    pub shipping_fee: Decimal,
    pub store_payout: Decimal,
    pub payout_status: PayoutStatus,
}

impl OrderFigures {
    /// What a full refund returns to the buyer.
    #[must_use]
    pub fn full_refund_amount(&self) -> Decimal {
        self.product_revenue + self.shipping_fee
    }
}

/// Money movements for one resolved dispute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directive {
    /// Amount credited to the buyer's wallet as a `REFUND`.
    pub buyer_refund: Option<Decimal>,
    /// Postings against the store's wallet, in order.
    pub store_postings: Vec<Posting>,
    /// Part of the buyer refund the store never received, such as the
    /// commission. The platform absorbs it.
    pub platform_share: Decimal,
    /// New payout status for the order, if it changes.
    pub payout_status: Option<PayoutStatus>,
    /// New payment status for the order, if it changes.
    pub payment_status: Option<PaymentStatus>,
}

impl Directive {
    /// Nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buyer_refund.is_none() && self.store_postings.is_empty()
    }
}

/// Compute the directive for a resolution.
///
/// The store gives back at most the payout it was credited for the order.
/// While that payout is still `PENDING` its side moves through the pending
/// amount. Once `RELEASED`, the store side becomes a balance clawback, which
/// the ledger refuses if the balance cannot cover it. Whatever the store
/// does not give back is the platform's share.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount` for a partial refund outside
/// `0 < buyer_amount < full refund`.
pub fn directive(
    resolution: DisputeResolution,
    order: &OrderFigures,
) -> Result<Directive, LedgerError> {
    match resolution {
        DisputeResolution::Rejected => Ok(Directive::default()),
        DisputeResolution::FullRefund => {
            let refund = order.full_refund_amount();
            let reversed = order.store_payout.min(refund).max(Decimal::ZERO);
            let (store_postings, payout_status) = match order.payout_status {
                PayoutStatus::Pending => (
                    positive(reversed).map(Posting::DeductPending).into_iter().collect(),
                    Some(PayoutStatus::Reversed),
                ),
                PayoutStatus::Released => (
                    positive(reversed).map(|x| Posting::Adjust(-x)).into_iter().collect(),
                    Some(PayoutStatus::Reversed),
                ),
                PayoutStatus::Unscheduled | PayoutStatus::Reversed => (Vec::new(), None),
            };
            let platform_share = if payout_status.is_some() {
                refund - reversed
            } else {
                Decimal::ZERO
            };

            Ok(Directive {
                buyer_refund: positive(refund),
                store_postings,
                platform_share,
                payout_status,
                payment_status: Some(PaymentStatus::Refunded),
            })
        }
        DisputeResolution::PartialRefund { buyer_amount } => {
            if buyer_amount <= Decimal::ZERO || buyer_amount >= order.full_refund_amount() {
                return Err(LedgerError::InvalidAmount(buyer_amount));
            }
            let remainder = (order.store_payout - buyer_amount).max(Decimal::ZERO);
            let withheld = order.store_payout - remainder;

            let mut store_postings = Vec::new();
            let mut platform_share = Decimal::ZERO;
            let payout_status = match order.payout_status {
                PayoutStatus::Pending => {
                    if remainder > Decimal::ZERO {
                        store_postings.push(Posting::ReleasePending(remainder));
                    }
                    if withheld > Decimal::ZERO {
                        store_postings.push(Posting::DeductPending(withheld));
                    }
                    platform_share = buyer_amount - withheld;
                    Some(if remainder > Decimal::ZERO {
                        PayoutStatus::Released
                    } else {
                        PayoutStatus::Reversed
                    })
                }
                PayoutStatus::Released => {
                    if withheld > Decimal::ZERO {
                        store_postings.push(Posting::Adjust(-withheld));
                    }
                    platform_share = buyer_amount - withheld;
                    None
                }
                PayoutStatus::Unscheduled | PayoutStatus::Reversed => None,
            };

            Ok(Directive {
                buyer_refund: Some(buyer_amount),
                store_postings,
                platform_share,
                payout_status,
                payment_status: Some(PaymentStatus::PartiallyRefunded),
            })
        }
    }
}

fn positive(x: Decimal) -> Option<Decimal> {
    (x > Decimal::ZERO).then_some(x)
}
