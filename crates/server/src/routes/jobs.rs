//! On-demand scheduler runs.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};

use crate::error::AppError;
use crate::services::{Job, SweepReport};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/jobs/{job}/run", post(run))
}

/// Run one pass of a job now, regardless of its schedule.
///
/// # Errors
///
/// `BAD_REQUEST` for an unknown job name; `DATABASE` when candidates cannot
/// be selected.
pub async fn run(
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> Result<Json<SweepReport>, AppError> {
    let job: Job = job
        .parse()
        .map_err(|e: crate::services::UnknownJob| AppError::BadRequest(e.to_string()))?;
    Ok(Json(state.services().scheduler.run(job).await?))
}

#[cfg(test)]
mod tests {
    use super::super::testing::call;
    use crate::services::testing::harness;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_run_job_by_name() {
        let h = harness();
        let (status, report) = call(&h, "POST", "/jobs/delivery-sweep/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["matched"], 0);

        let (status, _) = call(&h, "POST", "/jobs/cleanup/run", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
