//! Outbound notification contract.
//!
//! Transports (mail, chat, paging) live outside the engine. Pipelines hand a
//! message to a [`Notifier`] and move on; failures are logged, never
//! propagated back into the pipeline.

use crate::error::Result;

/// A single outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub sender: Option<String>,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn send(&self, message: &Notification) -> Result<()>;
}

/// Send `message` and log instead of returning any failure.
pub fn send_logged(notifier: &dyn Notifier, message: &Notification) {
    if let Err(e) = notifier.send(message) {
        tracing::warn!(
            "Failed to notify {} about '{}': {}",
            message.recipient,
            message.subject,
            e
        );
    }
}

/// Notifier that only writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, message: &Notification) -> Result<()> {
        tracing::info!(
            to = %message.recipient,
            from = message.sender.as_deref().unwrap_or("<default>"),
            subject = %message.subject,
            "{}",
            message.body
        );
        Ok(())
    }
}
