//! Withdrawal request handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;

use parcel_ledger_core::WithdrawalRequestId;
use parcel_ledger_core::ledger::WalletOwner;

use crate::error::AppError;
use crate::models::{BankDetails, WithdrawalRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/withdrawals", post(create))
        .route("/withdrawals/{id}", get(show))
        .route("/withdrawals/{id}/approve", post(approve))
        .route("/withdrawals/{id}/reject", post(reject))
        .route("/withdrawals/{id}/complete", post(complete))
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub owner: WalletOwner,
    pub amount: Decimal,
    #[serde(flatten)]
    pub bank: BankDetails,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub note: Option<String>,
}

/// # Errors
///
/// `INVALID_AMOUNT`, `INSUFFICIENT_BALANCE`, `BAD_REQUEST` for blank bank
/// details, or `CONFLICT` when an open request already blocks a new one.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), AppError> {
    let request = state
        .services()
        .withdrawals
        .create(body.owner, body.amount, body.bank)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// # Errors
///
/// `NOT_FOUND` for an unknown request.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<WithdrawalRequestId>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(state.services().withdrawals.get(id).await?))
}

/// # Errors
///
/// `NOT_FOUND` or `INVALID_STATE_TRANSITION`.
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<WithdrawalRequestId>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(state.services().withdrawals.approve(id, body.note).await?))
}

/// # Errors
///
/// `BAD_REQUEST` for a blank reason, `NOT_FOUND`, or
/// `INVALID_STATE_TRANSITION`.
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<WithdrawalRequestId>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    if body.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason must not be empty".to_string()));
    }
    Ok(Json(
        state
            .services()
            .withdrawals
            .reject(id, body.reason, body.note)
            .await?,
    ))
}

/// # Errors
///
/// `NOT_FOUND`, `INVALID_STATE_TRANSITION`, or `INSUFFICIENT_BALANCE` when
/// the balance no longer covers the request.
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<WithdrawalRequestId>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(state.services().withdrawals.complete(id, body.note).await?))
}
