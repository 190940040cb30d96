//! Turns raw domain events into persisted and broadcast notifications.

use std::sync::Arc;

use crate::channel::PublishChannel;
use crate::error::Result;
use crate::metrics::TRIGGERS_TOTAL;

use super::{EventData, Notification, NotificationBroker};

pub struct TriggerOrchestrator {
    broker: Arc<NotificationBroker>,
    channel: Arc<PublishChannel>,
}

impl TriggerOrchestrator {
    pub fn new(broker: Arc<NotificationBroker>, channel: Arc<PublishChannel>) -> Self {
        Self { broker, channel }
    }

    /// Build a notification from `event`, queue it, store its details and
    /// publish it live.
    ///
    /// Validation, queue write and detail write must all succeed, in that
    /// order, before anything is published; the first failure is returned
    /// and later steps are skipped. The two writes are not transactional:
    /// a crash between them leaves the notification queued without details.
    /// A failed publish is logged and does not undo the writes.
    #[tracing::instrument(
        name = "trigger.trigger_notification",
        skip(self, event),
        fields(event_type = ?event.event_type, user_id = ?event.user_id)
    )]
    pub async fn trigger_notification(&self, event: EventData) -> Result<Notification> {
        let notification = match Notification::from_event(event) {
            Ok(n) => n,
            Err(e) => {
                TRIGGERS_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::warn!(error = %e, "Rejected notification event");
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&notification).await {
            TRIGGERS_TOTAL.with_label_values(&["failed"]).inc();
            tracing::error!(
                notification_id = %notification.notification_id,
                error = %e,
                "Error triggering notification"
            );
            return Err(e);
        }

        match self.channel.publish(&notification).await {
            Ok(receivers) => {
                tracing::debug!(
                    notification_id = %notification.notification_id,
                    receivers,
                    "Notification published"
                );
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.notification_id,
                    error = %e,
                    "Live publish failed; notification remains queued and stored"
                );
            }
        }

        TRIGGERS_TOTAL.with_label_values(&["ok"]).inc();
        tracing::info!(
            notification_id = %notification.notification_id,
            event_type = %notification.event_type,
            "Notification triggered"
        );
        Ok(notification)
    }

    async fn persist(&self, notification: &Notification) -> Result<()> {
        self.broker.push(notification).await?;
        let fields = notification.to_detail_fields()?;
        self.broker
            .store_details(&notification.notification_id, &fields)
            .await
    }
}
