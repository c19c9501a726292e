use std::fmt::Display;

use async_trait::async_trait;

use pgharvest_core::Result;

/// A plain-text message about a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// `None` sends to the notifier's configured recipient.
    pub recipient: Option<String>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipient: None,
        }
    }

    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Standard message for a failed extract or load step.
    pub fn failure(operation: &str, error: &dyn Display) -> Self {
        Self::new(
            format!("Failure: {operation}"),
            format!("An error occurred in {operation}. The error is {error}"),
        )
    }
}

/// Delivery channel for failure notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Notifier used when email is not configured; it only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            event = "notification_suppressed",
            subject = %notification.subject,
            body = %notification.body
        );
        Ok(())
    }
}

/// Send `notification`, logging instead of returning any delivery failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(err) = notifier.send(&notification).await {
        tracing::warn!(
            event = "notification_failed",
            subject = %notification.subject,
            error = %err
        );
    }
}
