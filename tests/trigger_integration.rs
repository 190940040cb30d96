//! Trigger orchestration tests: queue, detail store and live channel together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use notification_core::channel::PublishChannel;
use notification_core::error::NotificationError;
use notification_core::notification::{
    EventData, Notification, NotificationBroker, TriggerOrchestrator,
};
use notification_core::store::keys::{detail_key, NOTIFICATION_CHANNEL, QUEUE_KEY};
use notification_core::store::{
    BackingStore, HashFields, ListEnd, MemoryStore, StoreError, StoreHealth, Subscription,
};

struct TestEnvironment {
    store: Arc<MemoryStore>,
    broker: Arc<NotificationBroker>,
    channel: Arc<PublishChannel>,
    orchestrator: TriggerOrchestrator,
}

async fn create_test_environment() -> TestEnvironment {
    let store = Arc::new(MemoryStore::new());
    store.connect().await.unwrap();

    let broker = Arc::new(NotificationBroker::new(store.clone()));
    let channel = Arc::new(PublishChannel::new(store.clone(), NOTIFICATION_CHANNEL));
    let orchestrator = TriggerOrchestrator::new(broker.clone(), channel.clone());

    TestEnvironment {
        store,
        broker,
        channel,
        orchestrator,
    }
}

#[tokio::test]
async fn test_trigger_queues_stores_and_publishes() {
    let env = create_test_environment().await;
    let mut subscription = env.channel.subscribe().await.unwrap();

    let event = EventData::new("KYC_UPDATE", "user-1")
        .reference_id("doc-1")
        .update_details(json!({ "status": "approved" }));
    let notification = env.orchestrator.trigger_notification(event).await.unwrap();

    assert!(!notification.notification_id.is_empty());
    assert!(notification.timestamp > 0);

    // Queue holds exactly this notification
    let queued: Notification = env.broker.pop().await.unwrap().unwrap();
    assert_eq!(queued, notification);
    assert!(env.broker.pop::<Notification>().await.unwrap().is_none());

    // Detail record keyed by the notification id
    let details = env
        .store
        .hash_get_all(&detail_key(&notification.notification_id))
        .await
        .unwrap();
    assert_eq!(details.get("eventType").map(String::as_str), Some("KYC_UPDATE"));
    assert_eq!(details.get("userId").map(String::as_str), Some("user-1"));

    // Live subscribers see the same record
    let payload = tokio::time::timeout(Duration::from_secs(1), subscription.next_message())
        .await
        .expect("publish not received")
        .unwrap()
        .unwrap();
    let published: Notification = serde_json::from_str(&payload).unwrap();
    assert_eq!(published, notification);
}

#[tokio::test]
async fn test_trigger_keeps_caller_event_id() {
    let env = create_test_environment().await;

    let notification = env
        .orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1").event_id("evt-42"))
        .await
        .unwrap();

    assert_eq!(notification.notification_id, "evt-42");
    assert!(env.broker.get_notification("evt-42").await.unwrap().is_some());
}

#[tokio::test]
async fn test_trigger_generates_distinct_ids() {
    let env = create_test_environment().await;

    let a = env
        .orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1"))
        .await
        .unwrap();
    let b = env
        .orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1"))
        .await
        .unwrap();

    assert_ne!(a.notification_id, b.notification_id);
}

#[tokio::test]
async fn test_invalid_event_has_no_side_effects() {
    let env = create_test_environment().await;
    let mut subscription = env.channel.subscribe().await.unwrap();

    let empty: EventData = serde_json::from_value(json!({})).unwrap();
    let result = env.orchestrator.trigger_notification(empty).await;
    assert!(matches!(result, Err(NotificationError::InvalidEvent(_))));

    let missing_user: EventData = serde_json::from_value(json!({ "eventType": "KYC_UPDATE" })).unwrap();
    assert!(env.orchestrator.trigger_notification(missing_user).await.is_err());

    assert!(env
        .store
        .list_pop(QUEUE_KEY, ListEnd::Head)
        .await
        .unwrap()
        .is_none());
    let nothing = tokio::time::timeout(Duration::from_millis(50), subscription.next_message()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_trigger_fails_when_store_is_down() {
    let env = create_test_environment().await;
    env.store.close().await;

    let result = env
        .orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1"))
        .await;
    assert!(matches!(result, Err(NotificationError::QueueWrite(_))));
}

#[tokio::test]
async fn test_trigger_succeeds_without_listeners() {
    let env = create_test_environment().await;

    let notification = env
        .orchestrator
        .trigger_notification(EventData::new("PAYMENT", "user-7"))
        .await
        .unwrap();

    let queued: Notification = env.broker.pop().await.unwrap().unwrap();
    assert_eq!(queued.notification_id, notification.notification_id);
}

/// Memory store that can be told to fail detail writes or publishes.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_hash_set: AtomicBool,
    fail_publish: AtomicBool,
}

#[async_trait]
impl BackingStore for FaultyStore {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.inner.connect().await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_remove(key, member).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.set_contains(key, member).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.list_push(key, value).await
    }

    async fn list_pop(&self, key: &str, end: ListEnd) -> Result<Option<String>, StoreError> {
        self.inner.list_pop(key, end).await
    }

    async fn hash_set(&self, key: &str, fields: &HashFields) -> Result<(), StoreError> {
        if self.fail_hash_set.load(Ordering::SeqCst) {
            return Err(StoreError::Disconnected);
        }
        self.inner.hash_set(key, fields).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields, StoreError> {
        self.inner.hash_get_all(key).await
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<usize, StoreError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(StoreError::Subscription("publish rejected".to_string()));
        }
        self.inner.publish(topic, message).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(topic).await
    }

    async fn health(&self) -> StoreHealth {
        self.inner.health().await
    }
}

async fn faulty_environment() -> (Arc<FaultyStore>, NotificationBroker, TriggerOrchestrator) {
    let store = Arc::new(FaultyStore::default());
    store.connect().await.unwrap();

    let broker = Arc::new(NotificationBroker::new(store.clone()));
    let channel = Arc::new(PublishChannel::new(store.clone(), NOTIFICATION_CHANNEL));
    let orchestrator = TriggerOrchestrator::new(broker, channel);
    (store.clone(), NotificationBroker::new(store), orchestrator)
}

#[tokio::test]
async fn test_publish_failure_keeps_durable_writes() {
    let (store, broker, orchestrator) = faulty_environment().await;
    store.fail_publish.store(true, Ordering::SeqCst);

    let notification = orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1"))
        .await
        .unwrap();

    let queued: Notification = broker.pop().await.unwrap().unwrap();
    assert_eq!(queued, notification);
    let stored = broker
        .get_notification(&notification.notification_id)
        .await
        .unwrap();
    assert_eq!(stored, Some(notification));
}

#[tokio::test]
async fn test_detail_write_failure_aborts_before_publish() {
    let (store, broker, orchestrator) = faulty_environment().await;
    let mut subscription = store.subscribe(NOTIFICATION_CHANNEL).await.unwrap();
    store.fail_hash_set.store(true, Ordering::SeqCst);

    let result = orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-1").event_id("n-7"))
        .await;
    assert!(matches!(result, Err(NotificationError::StoreUnavailable(_))));

    // The queue write is not rolled back
    let queued: Notification = broker.pop().await.unwrap().unwrap();
    assert_eq!(queued.notification_id, "n-7");
    assert!(broker.get_details("n-7").await.unwrap().is_empty());

    let nothing = tokio::time::timeout(Duration::from_millis(50), subscription.next_message()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_reserved_event_id_rejected_before_any_write() {
    let env = create_test_environment().await;
    let mut subscription = env.channel.subscribe().await.unwrap();

    for id in ["queue", "channel", "KYC_UPDATE:subscribers"] {
        let result = env
            .orchestrator
            .trigger_notification(EventData::new("KYC_UPDATE", "user-1").event_id(id))
            .await;
        assert!(matches!(result, Err(NotificationError::InvalidKey(_))), "{}", id);
    }

    assert!(env.broker.pop::<Notification>().await.unwrap().is_none());
    let nothing = tokio::time::timeout(Duration::from_millis(50), subscription.next_message()).await;
    assert!(nothing.is_err());

    // Queue keeps working for later triggers
    let notification = env
        .orchestrator
        .trigger_notification(EventData::new("KYC_UPDATE", "user-2"))
        .await
        .unwrap();
    let queued: Notification = env.broker.pop().await.unwrap().unwrap();
    assert_eq!(queued, notification);
}
