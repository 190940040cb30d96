//! Reactions to live notifications.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::notification::Notification;

/// Callback invoked once per notification received by a listener.
///
/// Errors and panics are contained by the listener: they are logged and
/// never reach other handlers or the subscription loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and for unregistering
    fn name(&self) -> &str;

    async fn handle(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Logs every received notification.
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            notification_id = %notification.notification_id,
            event_type = %notification.event_type,
            user_id = %notification.user_id,
            reference_id = ?notification.reference_id,
            timestamp = notification.timestamp,
            "Received notification"
        );
        Ok(())
    }
}

/// Forwards notifications into an mpsc channel for another task to consume.
///
/// Never waits for capacity: a full channel fails the delivery so a slow
/// consumer cannot hold up the listener.
pub struct ForwardingHandler {
    name: String,
    sender: mpsc::Sender<Notification>,
}

impl ForwardingHandler {
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl MessageHandler for ForwardingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        match self.sender.try_send(notification.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow::anyhow!(
                "forwarding channel full, dropped notification {}",
                notification.notification_id
            )),
            Err(TrySendError::Closed(_)) => Err(anyhow::anyhow!("forwarding receiver dropped")),
        }
    }
}

/// Handler backed by a plain closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        (self.f)(notification)
    }
}

pub fn handler_fn<F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        f,
    }
}
