//! Platform revenue recorded at delivery.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use parcel_ledger_core::{FeePolicy, RevenueType};

use crate::db::UnitOfWork;
use crate::error::AppError;
use crate::models::{NewAdminRevenue, Order};

/// Rows a delivered order contributes: service fee, shipping fee, and a
/// negative discount-loss row when the platform funded a discount.
#[must_use]
pub fn delivery_rows(order: &Order, fees: &FeePolicy, now: DateTime<Utc>) -> Vec<NewAdminRevenue> {
    let mut rows = vec![
        NewAdminRevenue {
            order_id: order.id,
            revenue_type: RevenueType::ServiceFee,
            amount: fees.commission(order.product_revenue),
            description: format!("Service fee for order {}", order.id),
            created_at: now,
        },
        NewAdminRevenue {
            order_id: order.id,
            revenue_type: RevenueType::ShippingFee,
            amount: order.shipping_fee,
            description: format!("Shipping fee for order {}", order.id),
            created_at: now,
        },
    ];

    if order.platform_discount > Decimal::ZERO {
        rows.push(NewAdminRevenue {
            order_id: order.id,
            revenue_type: RevenueType::PlatformDiscountLoss,
            amount: -order.platform_discount,
            description: format!("Platform-funded discount on order {}", order.id),
            created_at: now,
        });
    }
    rows
}

/// Write the delivery rows, skipping any that already exist.
///
/// Returns how many rows were new.
pub(crate) async fn record_delivery(
    uow: &mut dyn UnitOfWork,
    order: &Order,
    fees: &FeePolicy,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let mut inserted = 0;
    for row in delivery_rows(order, fees, now) {
        let revenue_type = row.revenue_type;
        if uow.insert_revenue(row).await? {
            inserted += 1;
        } else {
            debug!(
                order_id = %order.id,
                revenue_type = %revenue_type,
                "Revenue row already recorded"
            );
        }
    }
    Ok(inserted)
}
