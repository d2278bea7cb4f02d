//! SMS notifications
//!
//! Notifications are best effort: they are sent on a detached task after the
//! session write has committed and a failed send never reaches the caller.

mod sms;

pub use sms::SmsGatewayChannel;

use crate::session::mask_msisdn;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;

/// Messages the dialogue can trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Sent right after a successful login
    Welcome {
        phone_number: String,
        user_code: String,
    },
    /// Sent when the learner opens the progress overview
    ProgressReminder {
        phone_number: String,
        user_code: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::Welcome { phone_number, .. }
            | Notification::ProgressReminder { phone_number, .. } => phone_number,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::ProgressReminder { .. } => "progress_reminder",
        }
    }

    /// SMS body; `service_code` is the dial string shown to come back
    pub fn message(&self, service_code: &str) -> String {
        match self {
            Notification::Welcome { user_code, .. } => format!(
                "Welcome back, learner {user_code}! Dial {service_code} any time to check your courses."
            ),
            Notification::ProgressReminder { user_code, .. } => format!(
                "Keep going, learner {user_code}! Finish your modules to unlock certificates. Dial {service_code} to continue."
            ),
        }
    }
}

/// What the channel reports back for one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub message_id: String,
    pub recipient: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMS gateway unreachable: {0}")]
    Network(String),
    #[error("SMS gateway rejected the message: {0}")]
    Rejected(String),
}

/// Outbound message transport
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryRecord, NotifyError>;
}

#[async_trait]
impl<T: NotificationChannel + ?Sized> NotificationChannel for Arc<T> {
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryRecord, NotifyError> {
        (**self).send(recipient, message).await
    }
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryRecord, NotifyError> {
        tracing::info!(to = %mask_msisdn(recipient), body = message, "SMS (log only)");
        Ok(DeliveryRecord {
            message_id: uuid::Uuid::new_v4().to_string(),
            recipient: recipient.to_string(),
            status: "Logged".to_string(),
        })
    }
}

/// Fire-and-forget sender
#[derive(Clone)]
pub struct NotificationDispatcher {
    channel: Arc<dyn NotificationChannel>,
    service_code: String,
    tracker: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, service_code: impl Into<String>) -> Self {
        Self {
            channel,
            service_code: service_code.into(),
            tracker: TaskTracker::new(),
        }
    }

    /// Send in the background; failures are logged and dropped
    pub fn dispatch(&self, notification: Notification) {
        let channel = Arc::clone(&self.channel);
        let message = notification.message(&self.service_code);

        self.tracker.spawn(async move {
            let to = mask_msisdn(notification.recipient());
            match channel.send(notification.recipient(), &message).await {
                Ok(record) => tracing::debug!(
                    %to,
                    kind = notification.kind(),
                    message_id = %record.message_id,
                    status = %record.status,
                    "Notification sent"
                ),
                Err(e) => tracing::warn!(
                    %to,
                    kind = notification.kind(),
                    error = %e,
                    "Notification failed"
                ),
            }
        });
    }

    /// Wait for every send dispatched so far
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
