//! Money arithmetic for fees and store payouts.
//!
//! Amounts are `Decimal` in the currency's standard unit. The platform takes
//! a percentage commission on product revenue, capped at a fixed ceiling, and
//! the store's share of an order is whatever remains plus the shipping fee.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Errors in fee policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeePolicyError {
    /// Rate outside `0..=1`.
    #[error("commission rate must be between 0 and 1 (got {0})")]
    InvalidRate(Decimal),
    /// Negative cap.
    #[error("commission cap must not be negative (got {0})")]
    InvalidCap(Decimal),
}

/// Platform commission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeePolicy {
    rate: Decimal,
    cap: Decimal,
}

impl FeePolicy {
    /// Create a validated fee policy.
    ///
    /// # Errors
    ///
    /// Returns `FeePolicyError` if the rate is outside `0..=1` or the cap is negative.
    pub fn new(rate: Decimal, cap: Decimal) -> Result<Self, FeePolicyError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(FeePolicyError::InvalidRate(rate));
        }
        if cap < Decimal::ZERO {
            return Err(FeePolicyError::InvalidCap(cap));
        }
        Ok(Self { rate, cap })
    }

    /// Commission rate as a fraction (0.05 = 5%).
    #[must_use]
    pub const fn rate(&self) -> Decimal {
        self.rate
    }

    /// Commission ceiling per order.
    #[must_use]
    pub const fn cap(&self) -> Decimal {
        self.cap
    }

    /// `min(rate × product_revenue, cap)`, rounded to cents.
    #[must_use]
    pub fn commission(&self, product_revenue: Decimal) -> Decimal {
        if product_revenue <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (product_revenue * self.rate).round_dp(2).min(self.cap)
    }

    /// The store's share of an order: product revenue net of commission, plus shipping.
    #[must_use]
    pub fn store_payout(&self, product_revenue: Decimal, shipping_fee: Decimal) -> Decimal {
        product_revenue - self.commission(product_revenue) + shipping_fee
    }
}

impl Default for FeePolicy {
    /// 5% commission capped at 50,000.
    fn default() -> Self {
        Self {
            rate: Decimal::new(5, 2),
            cap: Decimal::new(50_000, 0),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_commission_below_cap() {
        let policy = FeePolicy::new(dec!(0.05), dec!(50000)).expect("valid policy");
        assert_eq!(policy.commission(dec!(200000)), dec!(10000));
    }

    #[test]
    fn test_commission_is_capped() {
        let policy = FeePolicy::new(dec!(0.05), dec!(50000)).expect("valid policy");
        assert_eq!(policy.commission(dec!(5000000)), dec!(50000));
    }

    #[test]
    fn test_commission_on_zero_revenue() {
        assert_eq!(FeePolicy::default().commission(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_store_payout_adds_shipping() {
        let policy = FeePolicy::default();
        // 300000 - 15000 + 30000
        assert_eq!(policy.store_payout(dec!(300000), dec!(30000)), dec!(315000));
    }

    #[test]
    fn test_rejects_rate_above_one() {
        assert_eq!(
            FeePolicy::new(dec!(1.5), dec!(10)),
            Err(FeePolicyError::InvalidRate(dec!(1.5)))
        );
    }

    #[test]
    fn test_rejects_negative_cap() {
        assert!(FeePolicy::new(dec!(0.05), dec!(-1)).is_err());
    }
}
