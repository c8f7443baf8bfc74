//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                  - Liveness
//! GET  /health/ready                            - Store reachable
//!
//! # Shipments
//! POST /orders/{id}/shipment                    - Create the forward shipment
//! GET  /shipments/{id}                          - Shipment detail
//! GET  /shipments/{id}/history                  - Audit trail
//! POST /shipments/{id}/{action}                 - Apply a shipper action
//!
//! # Wallets ({kind} = store | buyer)
//! GET  /wallets/{kind}/{owner_id}               - Get or create
//! GET  /wallets/{kind}/{owner_id}/transactions  - Ledger rows, oldest first
//! GET  /wallets/{kind}/{owner_id}/verify        - Replay check
//! POST /wallets/{kind}/{owner_id}/credit        - EARNING or REFUND
//! POST /wallets/{kind}/{owner_id}/debit         - PAYMENT or WITHDRAWAL
//! POST /wallets/{kind}/{owner_id}/adjust        - Signed correction
//!
//! # Withdrawals
//! POST /withdrawals                             - Open a request
//! GET  /withdrawals/{id}                        - Request detail
//! POST /withdrawals/{id}/approve | reject | complete
//!
//! # Returns
//! POST /orders/{id}/return-requests             - Open a return request
//! GET  /return-requests/{id}                    - Request detail
//! POST /return-requests/{id}/resolve            - Adjudicate
//! POST /return-requests/{id}/return-shipment    - Create the return leg
//!
//! # Jobs
//! POST /jobs/{job}/run                          - Run one scheduler job now
//! ```
//!
//! Mutating shipment routes take the acting party from `?actor=`
//! (`shipper:{id}`, `admin:{id}`, `system`); it defaults to `system`.

pub mod health;
pub mod jobs;
pub mod returns;
pub mod shipments;
pub mod wallets;
pub mod withdrawals;

use axum::Router;
use serde::Deserialize;

use crate::models::Actor;
use crate::state::AppState;

/// `?actor=` on mutating routes.
#[derive(Debug, Default, Deserialize)]
pub struct ActorQuery {
    #[serde(default)]
    pub actor: Actor,
}

/// Create all routes for the service.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(shipments::router())
        .merge(wallets::router())
        .merge(withdrawals::router())
        .merge(returns::router())
        .merge(jobs::router())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    //! Request helpers for route tests.

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::routes;
    use crate::services::testing::Harness;
    use crate::state::AppState;

    pub async fn call(
        h: &Harness,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let app = routes().with_state(AppState::new(h.services.clone()));
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, json)
    }
}
