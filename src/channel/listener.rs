//! Long-lived subscriber on the live notification channel.
//!
//! The listener keeps one subscription open, parses every payload into a
//! [`Notification`] and hands it to each registered [`MessageHandler`] in
//! registration order. Failures stay at the handler boundary. When the
//! subscription is lost the listener resubscribes with exponential backoff;
//! messages published in the gap are not replayed.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::error::NotificationError;
use crate::metrics::{
    LISTENER_HANDLER_FAILURES_TOTAL, LISTENER_MALFORMED_TOTAL, LISTENER_MESSAGES_TOTAL,
};
use crate::notification::Notification;
use crate::redis::{BackoffConfig, ExponentialBackoff};
use crate::store::Subscription;

use super::{MessageHandler, PublishChannel};

const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of handing one payload to the registered handlers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully
    pub delivered: usize,
    /// Handlers that returned an error, panicked or timed out
    pub failed: usize,
    /// Payload was not a notification; no handler ran
    pub malformed: bool,
}

#[derive(Debug, Default)]
struct ListenerStats {
    received: AtomicU64,
    malformed: AtomicU64,
    handler_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub handler_failures: u64,
}

enum StreamOutcome {
    Stopped,
    Ended,
}

pub struct NotificationListener {
    channel: Arc<PublishChannel>,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
    backoff: BackoffConfig,
    handler_timeout: Duration,
    shutdown: watch::Sender<bool>,
    subscribed: watch::Sender<bool>,
    stats: ListenerStats,
}

impl NotificationListener {
    pub fn new(channel: Arc<PublishChannel>) -> Self {
        Self {
            channel,
            handlers: RwLock::new(Vec::new()),
            backoff: BackoffConfig::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            shutdown: watch::Sender::new(false),
            subscribed: watch::Sender::new(false),
            stats: ListenerStats::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bound on a single handler call; a handler exceeding it counts as failed.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.get_mut().push(handler);
        self
    }

    /// Register a handler; it sees every message dispatched from now on.
    pub async fn register(&self, handler: Arc<dyn MessageHandler>) {
        tracing::debug!(handler = %handler.name(), "Registering notification handler");
        self.handlers.write().await.push(handler);
    }

    /// Remove every handler registered under `name`. Returns whether any was.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut handlers = self.handlers.write().await;
        let before = handlers.len();
        handlers.retain(|h| h.name() != name);
        before != handlers.len()
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    pub fn is_subscribed(&self) -> bool {
        *self.subscribed.borrow()
    }

    /// Resolves once the listener holds a live subscription.
    pub async fn wait_until_subscribed(&self) {
        let mut rx = self.subscribed.subscribe();
        let _ = rx.wait_for(|subscribed| *subscribed).await;
    }

    /// Ask a running (or future) `start` to unsubscribe and return.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            received: self.stats.received.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            handler_failures: self.stats.handler_failures.load(Ordering::Relaxed),
        }
    }

    /// Run the subscription loop until [`stop`](Self::stop) is called.
    ///
    /// The subscription is dropped, and with it its connection, on every
    /// exit path.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut backoff = ExponentialBackoff::new(self.backoff.clone());

        tracing::info!(topic = %self.topic(), "Starting notification listener");

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }

            match self.channel.subscribe().await {
                Ok(subscription) => {
                    backoff.reset();
                    let outcome = self.consume(subscription, &mut shutdown_rx).await;
                    self.subscribed.send_replace(false);
                    match outcome {
                        StreamOutcome::Stopped => break,
                        StreamOutcome::Ended => {
                            tracing::warn!(topic = %self.topic(), "Notification stream ended");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(topic = %self.topic(), error = %e, "Failed to subscribe");
                }
            }

            let delay = backoff.next_delay();
            tracing::info!(
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Resubscribing after delay"
            );
            tokio::select! {
                _ = wait_for_stop(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(topic = %self.topic(), "Notification listener stopped");
        Ok(())
    }

    async fn consume(
        &self,
        mut subscription: Subscription,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> StreamOutcome {
        self.subscribed.send_replace(true);
        tracing::info!(topic = %subscription.topic(), "Listening for notifications");

        loop {
            tokio::select! {
                biased;
                _ = wait_for_stop(shutdown_rx) => {
                    tracing::info!(topic = %subscription.topic(), "Unsubscribing");
                    return StreamOutcome::Stopped;
                }
                message = subscription.next_message() => match message {
                    Some(Ok(payload)) => {
                        self.dispatch(&payload).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Failed to read notification payload");
                    }
                    None => return StreamOutcome::Ended,
                },
            }
        }
    }

    /// Parse `payload` and run every registered handler on it.
    pub async fn dispatch(&self, payload: &str) -> DispatchReport {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        LISTENER_MESSAGES_TOTAL.inc();

        let notification: Notification = match serde_json::from_str(payload) {
            Ok(n) => n,
            Err(source) => {
                let err = NotificationError::MalformedEntry {
                    key: self.topic().to_string(),
                    source,
                };
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                LISTENER_MALFORMED_TOTAL.inc();
                tracing::warn!(error = %err, payload = %payload, "Error handling notification");
                return DispatchReport {
                    malformed: true,
                    ..DispatchReport::default()
                };
            }
        };

        // Snapshot so handlers may (un)register without deadlocking
        let handlers = self.handlers.read().await.clone();
        let mut report = DispatchReport::default();

        for handler in handlers {
            let call = AssertUnwindSafe(handler.handle(&notification)).catch_unwind();
            let Ok(outcome) = tokio::time::timeout(self.handler_timeout, call).await else {
                report.failed += 1;
                tracing::warn!(
                    handler = %handler.name(),
                    notification_id = %notification.notification_id,
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "Notification handler timed out"
                );
                continue;
            };

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        handler = %handler.name(),
                        notification_id = %notification.notification_id,
                        error = %e,
                        "Notification handler failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::error!(
                        handler = %handler.name(),
                        notification_id = %notification.notification_id,
                        "Notification handler panicked"
                    );
                }
            }
        }

        if report.failed > 0 {
            self.stats
                .handler_failures
                .fetch_add(report.failed as u64, Ordering::Relaxed);
            LISTENER_HANDLER_FAILURES_TOTAL.inc_by(report.failed as u64);
        }

        report
    }
}

/// Resolves once a stop was requested (or the sender is gone).
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
