//! The notification adapter: renders a message to a pluggable sink.
//!
//! Config:
//!
//! ```json
//! { "channel": "email", "recipient": "ops@example.com",
//!   "subject": "Order {{ input.orderId }}", "message": "..." }
//! ```

use crate::adapter::{Adapter, AdapterInfo, ExecutionContext};
use crate::error::AdapterError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use switchyard_core::{TenantId, WorkflowRunId};
use switchyard_resolver::Version;
use tokio::sync::Mutex;
use tracing::info;

/// Connector id of the notification adapter.
pub const CONNECTOR_ID: &str = "svc.sendNotification";

const DEFAULT_CHANNEL: &str = "email";

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub run_id: WorkflowRunId,
    pub channel: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
}

/// Where notifications are delivered.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a notification and returns a delivery id.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryFailed` if the sink rejects the notification.
    async fn deliver(&self, notification: Notification) -> Result<String, Report<AdapterError>>;
}

/// A sink that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: Notification) -> Result<String, Report<AdapterError>> {
        let delivery_id = format!("log-{}", notification.run_id);
        info!(
            tenant_id = %notification.tenant_id,
            channel = %notification.channel,
            recipient = %notification.recipient,
            subject = notification.subject.as_deref().unwrap_or(""),
            message = %notification.message,
            %delivery_id,
            "notification delivered"
        );
        Ok(delivery_id)
    }
}

/// A sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification delivered so far.
    pub async fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: Notification) -> Result<String, Report<AdapterError>> {
        let mut delivered = self.delivered.lock().await;
        delivered.push(notification);
        Ok(format!("rec-{}", delivered.len()))
    }
}

/// Sends a notification through the configured sink.
#[derive(Clone)]
pub struct SendNotificationAdapter {
    version: Version,
    sink: Arc<dyn NotificationSink>,
}

impl SendNotificationAdapter {
    #[must_use]
    pub fn new(version: Version, sink: Arc<dyn NotificationSink>) -> Self {
        Self { version, sink }
    }
}

#[async_trait]
impl Adapter for SendNotificationAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            connector_id: CONNECTOR_ID.to_string(),
            version: self.version.to_string(),
            description: "Sends a notification message".to_string(),
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<JsonValue, Report<AdapterError>> {
        let notification = Notification {
            tenant_id: ctx.tenant_id,
            run_id: ctx.run.run_id,
            channel: ctx
                .config_str("channel")
                .unwrap_or(DEFAULT_CHANNEL)
                .to_string(),
            recipient: ctx.require_str("recipient")?.to_string(),
            subject: ctx.config_str("subject").map(str::to_string),
            message: ctx.require_str("message")?.to_string(),
        };
        let channel = notification.channel.clone();
        let recipient = notification.recipient.clone();

        let delivery_id = self.sink.deliver(notification).await?;

        Ok(json!({
            "delivered": true,
            "deliveryId": delivery_id,
            "channel": channel,
            "recipient": recipient,
        }))
    }
}
