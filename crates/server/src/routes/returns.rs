//! Return request handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use parcel_ledger_core::settlement::DisputeResolution;
use parcel_ledger_core::{OrderId, ReturnRequestId};

use super::ActorQuery;
use crate::error::AppError;
use crate::models::{ReturnRequest, Shipment};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/return-requests", post(open))
        .route("/return-requests/{id}", get(show))
        .route("/return-requests/{id}/resolve", post(resolve))
        .route("/return-requests/{id}/return-shipment", post(return_shipment))
}

#[derive(Debug, Deserialize)]
pub struct OpenReturnRequest {
    pub reason: String,
    #[serde(default)]
    pub requires_return: bool,
}

/// `{"type": "PARTIAL_REFUND", "buyer_amount": "50", "note": "..."}`
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    pub resolution: DisputeResolution,
    pub note: Option<String>,
}

/// # Errors
///
/// `BAD_REQUEST`, `NOT_FOUND`, `INVALID_STATE_TRANSITION` unless the order
/// is delivered, or `CONFLICT` when a request is already open.
pub async fn open(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    Json(body): Json<OpenReturnRequest>,
) -> Result<(StatusCode, Json<ReturnRequest>), AppError> {
    let request = state
        .services()
        .settlement
        .open_return_request(order_id, &body.reason, body.requires_return)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// # Errors
///
/// `NOT_FOUND` for an unknown request.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ReturnRequestId>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(state.services().settlement.get(id).await?))
}

/// # Errors
///
/// `NOT_FOUND`, `INVALID_STATE_TRANSITION` for a conflicting resolution,
/// `INVALID_AMOUNT`, or `INSUFFICIENT_BALANCE`.
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<ReturnRequestId>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ReturnRequest>, AppError> {
    let request = state
        .services()
        .settlement
        .resolve_return_request(id, body.resolution, body.note)
        .await?;
    Ok(Json(request))
}

/// Create the reverse leg for an approved request whose goods travel back.
///
/// # Errors
///
/// `NOT_FOUND`, `INVALID_STATE_TRANSITION`, or `CONFLICT`.
pub async fn return_shipment(
    State(state): State<AppState>,
    Path(id): Path<ReturnRequestId>,
    Query(query): Query<ActorQuery>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let shipment = state
        .services()
        .shipments
        .create_return_shipment(id, query.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::testing::call;
    use crate::services::testing::{harness, new_order, seed_order};
    use axum::http::StatusCode;
    use parcel_ledger_core::PaymentMethod;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispute_over_http() {
        let h = harness();
        let order = seed_order(&h.store, new_order(PaymentMethod::Cod, dec!(200), dec!(15))).await;
        let (_, shipment) =
            call(&h, "POST", &format!("/orders/{}/shipment", order.id), None).await;
        let id = shipment["id"].as_i64().unwrap();
        for action in ["picking-up", "picked-up", "start-shipping", "deliver"] {
            let (status, _) = call(&h, "POST", &format!("/shipments/{id}/{action}"), None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, request) = call(
            &h,
            "POST",
            &format!("/orders/{}/return-requests", order.id),
            Some(json!({ "reason": "scratched" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let request_id = request["id"].as_i64().unwrap();

        let (status, resolved) = call(
            &h,
            "POST",
            &format!("/return-requests/{request_id}/resolve"),
            Some(json!({ "type": "PARTIAL_REFUND", "buyer_amount": "50", "note": "keeps it" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["status"], "APPROVED");
        assert!(resolved["settled_at"].is_string());

        let (_, buyer) = call(&h, "GET", "/wallets/buyer/100", None).await;
        assert_eq!(buyer["balance"], "50");

        let (status, err) = call(
            &h,
            "POST",
            &format!("/return-requests/{request_id}/return-shipment"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["kind"], "INVALID_STATE_TRANSITION");
    }
}
