//! Payment gateway refund client.
//!
//! Only the refund call is used here. Capture happens before an order ever
//! reaches fulfillment.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::PaymentGatewayConfig;

/// Errors that can occur when talking to the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("Gateway request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Gateway response error: {0}")]
    Response(String),

    /// Gateway returned an error status.
    #[error("Gateway API error: {0}")]
    Api(String),
}

/// A refund against a captured payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRequest {
    /// Gateway reference of the original payment.
    pub transaction_ref: String,
    pub amount: Decimal,
    pub description: String,
    /// Repeated calls with the same key refund at most once.
    #[serde(skip)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefundOutcome {
    pub success: bool,
    pub refund_ref: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Refund part or all of a captured payment.
    async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError>;
}

/// Gateway client over HTTP with a bearer API key.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for HttpPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentGateway")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpPaymentGateway {
    #[must_use]
    pub fn new(config: &PaymentGatewayConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(
        skip(self, request),
        fields(transaction_ref = %request.transaction_ref, amount = %request.amount)
    )]
    async fn refund(&self, request: &RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let url = self
            .base_url
            .join("refunds")
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(format!("{status}: {body}")));
        }

        let outcome: RefundOutcome = response
            .json()
            .await
            .map_err(|e| GatewayError::Response(e.to_string()))?;

        debug!(success = outcome.success, refund_ref = ?outcome.refund_ref, "Gateway refund answered");
        Ok(outcome)
    }
}
