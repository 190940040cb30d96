use std::sync::Arc;

use serde::Serialize;

use crate::error::{NotificationError, Result};
use crate::metrics::{PUBLISHED_TOTAL, PUBLISH_FAILED_TOTAL};
use crate::store::{BackingStore, Subscription};

/// Best-effort broadcast on one topic. Nothing is persisted, acknowledged
/// or replayed; listeners that are not subscribed at publish time miss it.
pub struct PublishChannel {
    store: Arc<dyn BackingStore>,
    topic: String,
}

impl PublishChannel {
    pub fn new(store: Arc<dyn BackingStore>, topic: impl Into<String>) -> Self {
        Self {
            store,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `message` as JSON. Returns how many listeners received it.
    pub async fn publish<T>(&self, message: &T) -> Result<usize>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(message)?;
        self.publish_raw(&payload).await
    }

    pub async fn publish_raw(&self, payload: &str) -> Result<usize> {
        match self.store.publish(&self.topic, payload).await {
            Ok(receivers) => {
                PUBLISHED_TOTAL.inc();
                Ok(receivers)
            }
            Err(e) => {
                PUBLISH_FAILED_TOTAL.inc();
                Err(NotificationError::PublishFailed(e))
            }
        }
    }

    /// Open a subscription to this channel's topic.
    pub async fn subscribe(&self) -> Result<Subscription> {
        Ok(self.store.subscribe(&self.topic).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let store = Arc::new(MemoryStore::new());
        store.connect().await.unwrap();
        let channel = PublishChannel::new(store, "notification:channel");

        assert_eq!(channel.publish(&serde_json::json!({"a": 1})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_distinguished() {
        let channel = PublishChannel::new(Arc::new(MemoryStore::new()), "t");
        let err = channel.publish_raw("x").await.unwrap_err();
        assert!(matches!(err, NotificationError::PublishFailed(_)));
    }
}
