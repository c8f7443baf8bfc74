//! Delivery date estimation.

use async_trait::async_trait;
use thiserror::Error;

use parcel_ledger_core::Address;

use crate::config::EstimatorConfig;

#[derive(Debug, Error)]
pub enum EstimatorError {
    /// The estimator has no answer for this route.
    #[error("no estimate for route: {0}")]
    Unavailable(String),
}

/// Estimates how many days a parcel takes between two addresses.
#[async_trait]
pub trait DeliveryEstimator: Send + Sync {
    async fn estimate_delivery_days(
        &self,
        from: &Address,
        to: &Address,
    ) -> Result<u32, EstimatorError>;
}

/// Flat estimate by region: same region or not.
#[derive(Debug, Clone, Copy)]
pub struct RegionEstimator {
    config: EstimatorConfig,
}

impl RegionEstimator {
    #[must_use]
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeliveryEstimator for RegionEstimator {
    async fn estimate_delivery_days(
        &self,
        from: &Address,
        to: &Address,
    ) -> Result<u32, EstimatorError> {
        if from.region.trim().is_empty() || to.region.trim().is_empty() {
            return Err(EstimatorError::Unavailable("missing region".to_string()));
        }
        if from.same_region(to) {
            Ok(self.config.same_region_days)
        } else {
            Ok(self.config.cross_region_days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(region: &str) -> Address {
        Address {
            contact_name: "Minh".to_string(),
            phone: "0911111111".to_string(),
            street: "5 Le Loi".to_string(),
            district: "Hai Chau".to_string(),
            region: region.to_string(),
        }
    }

    #[tokio::test]
    async fn test_region_estimates() {
        let estimator = RegionEstimator::new(EstimatorConfig::default());
        let same = estimator
            .estimate_delivery_days(&address("Da Nang"), &address("da nang"))
            .await;
        assert_eq!(same.ok(), Some(2));

        let cross = estimator
            .estimate_delivery_days(&address("Da Nang"), &address("Ha Noi"))
            .await;
        assert_eq!(cross.ok(), Some(4));
    }

    #[tokio::test]
    async fn test_missing_region_is_unavailable() {
        let estimator = RegionEstimator::new(EstimatorConfig::default());
        let result = estimator
            .estimate_delivery_days(&address(""), &address("Ha Noi"))
            .await;
        assert!(result.is_err());
    }
}
