//! Best-effort notification delivery.
//!
//! Senders are fire-and-forget from the ledger's point of view: a failed
//! delivery is logged and dropped, and never undoes the change it reports.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use parcel_ledger_core::{StoreId, UserId};

use super::events::DomainEvent;

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NotifyTarget {
    User(UserId),
    Store(StoreId),
    Admin,
}

/// One alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub target: NotifyTarget,
    pub title: String,
    pub body: String,
    /// Id of the shipment, request, or order the alert is about.
    pub related_id: Option<i64>,
}

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// HTTP request failed.
    #[error("Notification request failed: {0}")]
    Request(String),

    /// Receiver answered with a non-success status.
    #[error("Notification rejected with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            target_kind = ?notification.target,
            title = %notification.title,
            related_id = ?notification.related_id,
            "Notification"
        );
        Ok(())
    }
}

/// Posts each notification as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookNotifier {
    #[instrument(skip(self, notification), fields(title = %notification.title))]
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16()));
        }

        debug!("Notification delivered");
        Ok(())
    }
}

/// Turns committed domain events into notifications and sends them.
#[derive(Clone)]
pub struct Notifier {
    sender: std::sync::Arc<dyn NotificationSender>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    #[must_use]
    pub fn new(sender: std::sync::Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Send every notification the events imply. Failures are logged and dropped.
    pub async fn dispatch(&self, events: &[DomainEvent]) {
        for notification in events.iter().flat_map(DomainEvent::notifications) {
            if let Err(e) = self.sender.notify(&notification).await {
                warn!(
                    error = %e,
                    title = %notification.title,
                    related_id = ?notification.related_id,
                    "Failed to send notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_serializes_with_kind() {
        let json = serde_json::to_value(NotifyTarget::Store(StoreId::new(4)));
        assert_eq!(
            json.ok(),
            Some(serde_json::json!({ "kind": "store", "id": 4 }))
        );
        let json = serde_json::to_value(NotifyTarget::Admin);
        assert_eq!(json.ok(), Some(serde_json::json!({ "kind": "admin" })));
    }
}
