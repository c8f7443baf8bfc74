//! Run a scheduler job from the command line.
//!
//! Useful when the server runs with `SCHEDULER_ENABLED=false` and jobs are
//! driven by an external cron instead.

use parcel_ledger_server::services::Job;

use super::{CommandError, connect};

/// Run one pass of `job` and log its report.
///
/// # Errors
///
/// Returns an error if the services cannot be wired or the job's selection
/// query fails. Per-item failures only show up in the report.
pub async fn run(job: Job) -> Result<(), CommandError> {
    let services = connect().await?;

    tracing::info!(job = %job, "Running job...");
    let report = services.scheduler.run(job).await?;

    tracing::info!(
        job = %job,
        matched = report.matched,
        advanced = report.advanced,
        skipped = report.skipped,
        failed = report.failed,
        "Job complete"
    );
    Ok(())
}
