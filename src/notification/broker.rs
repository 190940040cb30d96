//! Notification broker: subscription registry, durable queue and detail store
//! on top of one backing store.
//!
//! Every method is a single store operation and atomic on its own. Nothing
//! here spans two operations; callers that need "queue + details" accept
//! that the two writes are independent.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, Result};
use crate::metrics::{
    DETAILS_STORED_TOTAL, QUEUE_EMPTY_POPS_TOTAL, QUEUE_MALFORMED_TOTAL, QUEUE_POPPED_TOTAL,
    QUEUE_PUSHED_TOTAL, STORE_ERRORS_TOTAL, SUBSCRIPTION_CHANGES_TOTAL,
};
use crate::store::keys::{detail_key, subscribers_key, QUEUE_KEY};
use crate::store::{BackingStore, HashFields, ListEnd, StoreError};

use super::types::detail_id;
use super::Notification;

/// Which pending entry `pop` returns.
///
/// Entries are always pushed at the head of the queue list. `Lifo` pops the
/// head (most recent first), `Fifo` pops the tail (oldest first).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    #[default]
    Lifo,
    Fifo,
}

impl QueueOrder {
    fn pop_end(self) -> ListEnd {
        match self {
            QueueOrder::Lifo => ListEnd::Head,
            QueueOrder::Fifo => ListEnd::Tail,
        }
    }
}

pub struct NotificationBroker {
    store: Arc<dyn BackingStore>,
    queue_order: QueueOrder,
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        Err(NotificationError::InvalidKey(format!("{} must not be empty", what)))
    } else {
        Ok(value)
    }
}

fn store_failure(operation: &'static str, err: StoreError) -> StoreError {
    STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    tracing::error!(operation, error = %err, "Backing store operation failed");
    err
}

impl NotificationBroker {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self::with_queue_order(store, QueueOrder::default())
    }

    pub fn with_queue_order(store: Arc<dyn BackingStore>, queue_order: QueueOrder) -> Self {
        Self { store, queue_order }
    }

    pub fn queue_order(&self) -> QueueOrder {
        self.queue_order
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Subscription registry
    // ------------------------------------------------------------------

    /// Add `user_id` to the subscribers of `notification_type`. Subscribing
    /// twice is a no-op.
    #[tracing::instrument(name = "broker.subscribe", skip(self))]
    pub async fn subscribe(&self, notification_type: &str, user_id: &str) -> Result<()> {
        let key = subscribers_key(non_empty(notification_type, "notification type")?);
        let user_id = non_empty(user_id, "user id")?;

        let added = self
            .store
            .set_add(&key, user_id)
            .await
            .map_err(|e| store_failure("subscribe", e))?;

        if added {
            SUBSCRIPTION_CHANGES_TOTAL.with_label_values(&["subscribe"]).inc();
        }
        tracing::debug!(added, "User subscribed");
        Ok(())
    }

    /// Remove `user_id` from the subscribers of `notification_type`.
    /// Removing a non-member is a no-op.
    #[tracing::instrument(name = "broker.unsubscribe", skip(self))]
    pub async fn unsubscribe(&self, notification_type: &str, user_id: &str) -> Result<()> {
        let key = subscribers_key(non_empty(notification_type, "notification type")?);
        let user_id = non_empty(user_id, "user id")?;

        let removed = self
            .store
            .set_remove(&key, user_id)
            .await
            .map_err(|e| store_failure("unsubscribe", e))?;

        if removed {
            SUBSCRIPTION_CHANGES_TOTAL
                .with_label_values(&["unsubscribe"])
                .inc();
        }
        tracing::debug!(removed, "User unsubscribed");
        Ok(())
    }

    pub async fn is_subscribed(&self, notification_type: &str, user_id: &str) -> Result<bool> {
        let key = subscribers_key(non_empty(notification_type, "notification type")?);
        let user_id = non_empty(user_id, "user id")?;

        let present = self
            .store
            .set_contains(&key, user_id)
            .await
            .map_err(|e| store_failure("is_subscribed", e))?;
        Ok(present)
    }

    // ------------------------------------------------------------------
    // Durable queue
    // ------------------------------------------------------------------

    /// Serialize `entry` and append it to the queue. On error nothing was
    /// written and the entry counts as not delivered.
    #[tracing::instrument(name = "broker.push", skip_all)]
    pub async fn push<T>(&self, entry: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(entry)?;

        self.store
            .list_push(QUEUE_KEY, &payload)
            .await
            .map_err(|e| NotificationError::QueueWrite(store_failure("push", e)))?;

        QUEUE_PUSHED_TOTAL.inc();
        tracing::debug!(bytes = payload.len(), "Entry pushed to queue");
        Ok(())
    }

    /// Remove and return the next entry per the configured [`QueueOrder`].
    ///
    /// An empty queue yields `Ok(None)`. An entry that does not deserialize
    /// into `T` yields `MalformedEntry`; it has already left the queue, so
    /// its raw payload is logged.
    #[tracing::instrument(name = "broker.pop", skip(self), fields(order = ?self.queue_order))]
    pub async fn pop<T>(&self) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let payload = self
            .store
            .list_pop(QUEUE_KEY, self.queue_order.pop_end())
            .await
            .map_err(|e| store_failure("pop", e))?;

        let Some(payload) = payload else {
            QUEUE_EMPTY_POPS_TOTAL.inc();
            return Ok(None);
        };

        QUEUE_POPPED_TOTAL.inc();
        match serde_json::from_str(&payload) {
            Ok(entry) => Ok(Some(entry)),
            Err(source) => {
                QUEUE_MALFORMED_TOTAL.inc();
                tracing::warn!(
                    error = %source,
                    payload = %payload,
                    "Discarding malformed queue entry"
                );
                Err(NotificationError::MalformedEntry {
                    key: QUEUE_KEY.to_string(),
                    source,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Detail store
    // ------------------------------------------------------------------

    /// Write (or overwrite) the detail fields of a notification.
    ///
    /// The id must be non-blank and must not address the queue, channel or a
    /// subscriber set. An empty field mapping writes nothing.
    #[tracing::instrument(name = "broker.store_details", skip(self, fields), fields(field_count = fields.len()))]
    pub async fn store_details(&self, notification_id: &str, fields: &HashFields) -> Result<()> {
        let key = detail_key(detail_id(notification_id)?);

        if fields.is_empty() {
            tracing::debug!("No detail fields to store");
            return Ok(());
        }

        self.store
            .hash_set(&key, fields)
            .await
            .map_err(|e| store_failure("store_details", e))?;

        DETAILS_STORED_TOTAL.inc();
        Ok(())
    }

    /// All detail fields of a notification; empty when the id is unknown.
    #[tracing::instrument(name = "broker.get_details", skip(self))]
    pub async fn get_details(&self, notification_id: &str) -> Result<HashFields> {
        let key = detail_key(detail_id(notification_id)?);

        let fields = self
            .store
            .hash_get_all(&key)
            .await
            .map_err(|e| store_failure("get_details", e))?;
        Ok(fields)
    }

    /// The stored notification, if the detail record describes one.
    pub async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>> {
        let fields = self.get_details(notification_id).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Notification::from_detail_fields(&fields))
    }
}
