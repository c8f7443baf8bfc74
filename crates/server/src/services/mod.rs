//! Business logic services for the ledger.
//!
//! # Services
//!
//! - `shipments` - Shipment creation and guarded transitions
//! - `wallets` - Store and buyer wallet postings
//! - `withdrawals` - Withdrawal request workflow
//! - `settlement` - Return requests and dispute money directives
//! - `revenue` - Platform revenue rows written at delivery
//! - `scheduler` - Timed sweeps that advance stalled shipments and release payouts
//!
//! # Collaborators
//!
//! - `clock` - Injected time source
//! - `notifications` - Best-effort alert delivery
//! - `payment_gateway` - Refunds against captured payments
//! - `estimator` - Expected delivery dates

pub mod clock;
pub mod estimator;
pub mod events;
pub mod notifications;
pub mod payment_gateway;
pub mod revenue;
pub mod scheduler;
pub mod settlement;
pub mod shipments;
pub mod wallets;
pub mod withdrawals;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use parcel_ledger_core::FeePolicy;

use crate::config::{LedgerConfig, SchedulerConfig};
use crate::db::LedgerStore;

pub use clock::{Clock, ManualClock, SystemClock};
pub use estimator::{DeliveryEstimator, EstimatorError, RegionEstimator};
pub use events::{DomainEvent, RefundChannel};
pub use notifications::{
    LogNotifier, Notification, NotificationError, NotificationSender, Notifier, NotifyTarget,
    WebhookNotifier,
};
pub use payment_gateway::{
    GatewayError, HttpPaymentGateway, PaymentGateway, RefundOutcome, RefundRequest,
};
pub use scheduler::{Job, Scheduler, SweepReport, UnknownJob};
pub use settlement::SettlementService;
pub use shipments::ShipmentService;
pub use wallets::{LedgerVerification, WalletService};
pub use withdrawals::WithdrawalService;

/// Collaborators the services are built from.
#[derive(Clone)]
pub struct Dependencies {
    pub store: Arc<dyn LedgerStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn NotificationSender>,
    /// Without a gateway, buyer refunds always go to the buyer wallet.
    pub gateway: Option<Arc<dyn PaymentGateway>>,
    pub estimator: Arc<dyn DeliveryEstimator>,
}

impl Dependencies {
    /// Production collaborators: webhook or log notifications, the HTTP
    /// gateway when configured, the region estimator, and the system clock.
    #[must_use]
    pub fn from_config(config: &LedgerConfig, store: Arc<dyn LedgerStore>) -> Self {
        let notifier: Arc<dyn NotificationSender> = match &config.notify_webhook_url {
            Some(url) => {
                tracing::info!(url = %url, "Notifications go to webhook");
                Arc::new(WebhookNotifier::new(url.clone()))
            }
            None => Arc::new(LogNotifier),
        };
        let gateway = config.payment_gateway.as_ref().map(|gateway| {
            tracing::info!(url = %gateway.base_url, "Refunds go through payment gateway");
            Arc::new(HttpPaymentGateway::new(gateway)) as Arc<dyn PaymentGateway>
        });

        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier,
            gateway,
            estimator: Arc::new(RegionEstimator::new(config.estimator)),
        }
    }
}

/// Business rules the services apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    pub fees: FeePolicy,
    pub scheduler: SchedulerConfig,
    /// Refuse a second open withdrawal for stores too, not only buyers.
    pub withdrawal_store_single_open: bool,
}

impl From<&LedgerConfig> for Settings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            fees: config.fees,
            scheduler: config.scheduler,
            withdrawal_store_single_open: config.withdrawal_store_single_open,
        }
    }
}

/// State every service shares.
pub(crate) struct Context {
    pub(crate) store: Arc<dyn LedgerStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Notifier,
    pub(crate) gateway: Option<Arc<dyn PaymentGateway>>,
    pub(crate) estimator: Arc<dyn DeliveryEstimator>,
    pub(crate) settings: Settings,
}

impl Context {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Every service, wired to one set of collaborators.
#[derive(Clone)]
pub struct Services {
    pub shipments: ShipmentService,
    pub wallets: WalletService,
    pub withdrawals: WithdrawalService,
    pub settlement: SettlementService,
    pub scheduler: Scheduler,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    #[must_use]
    pub fn new(deps: Dependencies, settings: Settings) -> Self {
        let ctx = Arc::new(Context {
            store: deps.store,
            clock: deps.clock,
            notifier: Notifier::new(deps.notifier),
            gateway: deps.gateway,
            estimator: deps.estimator,
            settings,
        });

        let shipments = ShipmentService::new(Arc::clone(&ctx));
        let settlement = SettlementService::new(Arc::clone(&ctx));
        Self {
            wallets: WalletService::new(Arc::clone(&ctx)),
            withdrawals: WithdrawalService::new(Arc::clone(&ctx)),
            scheduler: Scheduler::new(Arc::clone(&ctx), shipments.clone(), settlement.clone()),
            shipments,
            settlement,
        }
    }

    /// Store the services run against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        self.wallets.store()
    }
}
