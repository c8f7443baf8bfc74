//! Timed jobs that advance stalled shipments and release matured payouts.
//!
//! Every job selects candidates by status and age, then re-checks each one
//! under its row lock. A candidate that moved on in between is skipped, so
//! running a job twice, or alongside a manual action, changes nothing twice.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use parcel_ledger_core::ShipmentStatus;
use parcel_ledger_core::shipment::ShipmentAction;

use super::Context;
use super::settlement::SettlementService;
use super::shipments::{Plan, ShipmentService};
use crate::error::AppError;
use crate::models::Actor;

/// A scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Job {
    /// Move shipments stuck in `PICKING` on to their in-transit status.
    PickingSweep,
    /// Confirm delivery of shipments stuck in `SHIPPING`.
    DeliverySweep,
    /// Fill in missing expected-delivery dates.
    EstimateBackfill,
    /// Mature pending payouts whose hold period is over.
    PayoutRelease,
}

impl Job {
    pub const ALL: [Self; 4] = [
        Self::PickingSweep,
        Self::DeliverySweep,
        Self::EstimateBackfill,
        Self::PayoutRelease,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PickingSweep => "picking-sweep",
            Self::DeliverySweep => "delivery-sweep",
            Self::EstimateBackfill => "estimate-backfill",
            Self::PayoutRelease => "payout-release",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job: {0}")]
pub struct UnknownJob(pub String);

impl std::str::FromStr for Job {
    type Err = UnknownJob;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| UnknownJob(s.to_string()))
    }
}

/// What one job run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidates the selection query returned.
    pub matched: usize,
    pub advanced: usize,
    /// Candidates that no longer qualified once locked.
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record<T>(&mut self, job: Job, id: impl std::fmt::Display, outcome: Result<bool, T>)
    where
        T: std::fmt::Display,
    {
        match outcome {
            Ok(true) => self.advanced += 1,
            Ok(false) => self.skipped += 1,
            Err(e) => {
                warn!(job = %job, id = %id, error = %e, "Scheduled item failed");
                self.failed += 1;
            }
        }
    }
}

/// Runs jobs on demand or on fixed intervals.
#[derive(Clone)]
pub struct Scheduler {
    ctx: Arc<Context>,
    shipments: ShipmentService,
    settlement: SettlementService,
}

impl Scheduler {
    pub(crate) const fn new(
        ctx: Arc<Context>,
        shipments: ShipmentService,
        settlement: SettlementService,
    ) -> Self {
        Self {
            ctx,
            shipments,
            settlement,
        }
    }

    /// Run one pass of a job.
    ///
    /// Per-item failures are logged and counted; only a failing selection
    /// query fails the run.
    ///
    /// # Errors
    ///
    /// Returns the store error when candidates cannot be selected.
    #[instrument(skip(self), fields(job = %job))]
    pub async fn run(&self, job: Job) -> Result<SweepReport, AppError> {
        let config = self.ctx.settings.scheduler;
        let now = self.ctx.now();
        let mut report = SweepReport::default();

        match job {
            Job::PickingSweep | Job::DeliverySweep => {
                let (status, after, plan) = if job == Job::PickingSweep {
                    (ShipmentStatus::Picking, config.picking_after, Plan::AutoFromPicking)
                } else {
                    (
                        ShipmentStatus::Shipping,
                        config.delivery_after,
                        Plan::One(ShipmentAction::Deliver),
                    )
                };
                let ids = self
                    .ctx
                    .store
                    .shipments_in_status_since(status, now - age(after)?, config.batch_size)
                    .await?;
                report.matched = ids.len();
                for id in ids {
                    let outcome = self
                        .shipments
                        .advance(id, Some(status), plan, Actor::Scheduler)
                        .await
                        .map(|moved| moved.is_some());
                    report.record(job, id, outcome);
                }
            }
            Job::EstimateBackfill => {
                let ids = self
                    .ctx
                    .store
                    .shipments_missing_estimate(config.batch_size)
                    .await?;
                report.matched = ids.len();
                for id in ids {
                    let outcome = self.shipments.backfill_estimate(id).await;
                    report.record(job, id, outcome);
                }
            }
            Job::PayoutRelease => {
                let delivered_before = now - age(config.payout_hold)?;
                let ids = self
                    .ctx
                    .store
                    .payouts_due(delivered_before, config.batch_size)
                    .await?;
                report.matched = ids.len();
                for id in ids {
                    let outcome = self.settlement.release_payout(id, delivered_before).await;
                    report.record(job, id, outcome);
                }
            }
        }

        if report.matched > 0 {
            info!(
                matched = report.matched,
                advanced = report.advanced,
                skipped = report.skipped,
                failed = report.failed,
                "Job finished"
            );
        } else {
            debug!("Job found nothing to do");
        }
        Ok(report)
    }

    /// Tick interval for a job.
    #[must_use]
    pub fn interval(&self, job: Job) -> Duration {
        let config = &self.ctx.settings.scheduler;
        match job {
            Job::PickingSweep => config.picking_after,
            Job::DeliverySweep => config.delivery_after,
            Job::EstimateBackfill => config.backfill_every,
            Job::PayoutRelease => config.payout_release_every,
        }
    }

    /// Start one loop per job. Each loop runs its job immediately, then on
    /// every tick, until `token` is cancelled.
    #[must_use]
    pub fn spawn(&self, token: &CancellationToken) -> Vec<JoinHandle<()>> {
        Job::ALL
            .into_iter()
            .map(|job| {
                let scheduler = self.clone();
                let token = token.clone();
                let every = self.interval(job);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(every);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    info!(job = %job, every_secs = every.as_secs(), "Scheduler loop started");

                    loop {
                        tokio::select! {
                            () = token.cancelled() => break,
                            _ = ticker.tick() => {
                                if let Err(e) = scheduler.run(job).await {
                                    error!(job = %job, error = %e, "Scheduled job failed");
                                }
                            }
                        }
                    }

                    info!(job = %job, "Scheduler loop stopped");
                })
            })
            .collect()
    }
}

fn age(threshold: Duration) -> Result<chrono::Duration, AppError> {
    chrono::Duration::from_std(threshold)
        .map_err(|e| AppError::Internal(format!("scheduler threshold out of range: {e}")))
}
