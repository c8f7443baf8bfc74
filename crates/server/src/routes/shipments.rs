//! Shipment handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use parcel_ledger_core::shipment::ShipmentAction;
use parcel_ledger_core::{OrderId, ShipmentId};

use super::ActorQuery;
use crate::error::AppError;
use crate::models::{HistoryEntry, Shipment};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/shipment", post(create))
        .route("/shipments/{id}", get(show))
        .route("/shipments/{id}/history", get(history))
        .route("/shipments/{id}/{action}", post(transition))
}

/// Create the forward shipment for an order.
///
/// # Errors
///
/// `NOT_FOUND`, `INVALID_STATE_TRANSITION`, or `CONFLICT` when the order
/// already has an active shipment.
pub async fn create(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    Query(query): Query<ActorQuery>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let shipment = state
        .services()
        .shipments
        .create_shipment(order_id, query.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

/// # Errors
///
/// `NOT_FOUND` for an unknown shipment.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ShipmentId>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(state.services().shipments.get(id).await?))
}

/// # Errors
///
/// `NOT_FOUND` for an unknown shipment.
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<ShipmentId>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    Ok(Json(state.services().shipments.history(id).await?))
}

/// Apply one shipper action (`picking-up`, `deliver`, ...).
///
/// # Errors
///
/// `BAD_REQUEST` for an unknown action, `NOT_FOUND`, and
/// `INVALID_STATE_TRANSITION` when the shipment is not in the action's
/// source status.
pub async fn transition(
    State(state): State<AppState>,
    Path((id, action)): Path<(ShipmentId, String)>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Shipment>, AppError> {
    let action: ShipmentAction = action.parse().map_err(AppError::BadRequest)?;
    let shipment = state
        .services()
        .shipments
        .transition(id, action, query.actor)
        .await?;
    Ok(Json(shipment))
}
