//! Wallet handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;

use parcel_ledger_core::OrderId;
use parcel_ledger_core::ledger::{TransactionType, WalletKind, WalletOwner};

use crate::error::AppError;
use crate::models::{Transaction, Wallet};
use crate::services::LedgerVerification;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wallets/{kind}/{owner_id}", get(show))
        .route("/wallets/{kind}/{owner_id}/transactions", get(transactions))
        .route("/wallets/{kind}/{owner_id}/verify", get(verify))
        .route("/wallets/{kind}/{owner_id}/credit", post(credit))
        .route("/wallets/{kind}/{owner_id}/debit", post(debit))
        .route("/wallets/{kind}/{owner_id}/adjust", post(adjust))
}

/// Body for credit and debit.
#[derive(Debug, Deserialize)]
pub struct PostingRequest {
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub description: String,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Signed; negative takes money out.
    pub delta: Decimal,
    pub description: String,
}

fn owner((kind, owner_id): (WalletKind, i64)) -> WalletOwner {
    WalletOwner::from_parts(kind, owner_id)
}

/// Get the owner's wallet, creating an empty one on first access.
///
/// # Errors
///
/// `DATABASE` when the store fails.
pub async fn show(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
) -> Result<Json<Wallet>, AppError> {
    Ok(Json(state.services().wallets.get_or_create(owner(path)).await?))
}

/// # Errors
///
/// `DATABASE` when the store fails.
pub async fn transactions(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.services().wallets.transactions(owner(path)).await?))
}

/// Replay the wallet's ledger and compare it with the stored balances.
///
/// # Errors
///
/// `NOT_FOUND` when the owner has no wallet.
pub async fn verify(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
) -> Result<Json<LedgerVerification>, AppError> {
    Ok(Json(state.services().wallets.verify(owner(path)).await?))
}

/// # Errors
///
/// `INVALID_AMOUNT` unless `amount > 0`; `BAD_REQUEST` unless `type` is
/// `EARNING` or `REFUND`.
pub async fn credit(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
    Json(body): Json<PostingRequest>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .services()
        .wallets
        .credit(
            owner(path),
            body.amount,
            body.transaction_type,
            &body.description,
            body.order_id,
        )
        .await?;
    Ok(Json(tx))
}

/// # Errors
///
/// `INVALID_AMOUNT`, `INSUFFICIENT_BALANCE`, or `BAD_REQUEST` unless `type`
/// is `PAYMENT` or `WITHDRAWAL`.
pub async fn debit(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
    Json(body): Json<PostingRequest>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .services()
        .wallets
        .debit(
            owner(path),
            body.amount,
            body.transaction_type,
            &body.description,
            body.order_id,
        )
        .await?;
    Ok(Json(tx))
}

/// # Errors
///
/// `INVALID_AMOUNT` for a zero delta; `INSUFFICIENT_BALANCE` when a negative
/// delta would overdraw the balance.
pub async fn adjust(
    State(state): State<AppState>,
    Path(path): Path<(WalletKind, i64)>,
    Json(body): Json<AdjustRequest>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .services()
        .wallets
        .adjust(owner(path), body.delta, &body.description)
        .await?;
    Ok(Json(tx))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testing::call;
    use crate::services::testing::harness;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_credit_debit_and_verify() {
        let h = harness();
        let (status, wallet) = call(&h, "GET", "/wallets/store/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wallet["balance"], "0");

        let (status, tx) = call(
            &h,
            "POST",
            "/wallets/store/7/credit",
            Some(json!({ "amount": "120.50", "type": "EARNING", "description": "sale" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tx["balance_after"], "120.50");

        let (status, err) = call(
            &h,
            "POST",
            "/wallets/store/7/debit",
            Some(json!({ "amount": "500", "type": "PAYMENT", "description": "too much" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["kind"], "INSUFFICIENT_BALANCE");

        let (status, err) = call(
            &h,
            "POST",
            "/wallets/store/7/credit",
            Some(json!({ "amount": "5", "type": "PENDING", "description": "wrong type" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "BAD_REQUEST");

        let (status, report) = call(&h, "GET", "/wallets/store/7/verify", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["consistent"], true);
        assert_eq!(report["transactions"], 1);
    }

    #[tokio::test]
    async fn test_verify_unknown_wallet() {
        let h = harness();
        let (status, _) = call(&h, "GET", "/wallets/buyer/55/verify", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
