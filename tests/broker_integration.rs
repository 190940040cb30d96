//! Broker integration tests against the in-memory store.

use std::sync::Arc;

use serde_json::{json, Value};

use notification_core::error::NotificationError;
use notification_core::notification::{EventData, Notification, NotificationBroker, QueueOrder};
use notification_core::store::keys::{subscribers_key, QUEUE_KEY};
use notification_core::store::{BackingStore, HashFields, ListEnd, MemoryStore};

async fn setup(order: QueueOrder) -> (Arc<MemoryStore>, NotificationBroker) {
    let store = Arc::new(MemoryStore::new());
    store.connect().await.unwrap();
    let broker = NotificationBroker::with_queue_order(store.clone(), order);
    (store, broker)
}

fn fields(pairs: &[(&str, &str)]) -> HashFields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let (store, broker) = setup(QueueOrder::Lifo).await;

    tokio_test::assert_ok!(broker.subscribe("KYC_UPDATE", "user-1").await);
    tokio_test::assert_ok!(broker.subscribe("KYC_UPDATE", "user-1").await);
    tokio_test::assert_ok!(broker.subscribe("KYC_UPDATE", "user-2").await);

    assert!(broker.is_subscribed("KYC_UPDATE", "user-1").await.unwrap());
    assert!(!broker.is_subscribed("PAYMENT", "user-1").await.unwrap());
    assert!(store
        .set_contains(&subscribers_key("KYC_UPDATE"), "user-2")
        .await
        .unwrap());

    broker.unsubscribe("KYC_UPDATE", "user-1").await.unwrap();
    broker.unsubscribe("KYC_UPDATE", "user-1").await.unwrap();
    broker.unsubscribe("NEVER_USED", "user-1").await.unwrap();

    assert!(!broker.is_subscribed("KYC_UPDATE", "user-1").await.unwrap());
    assert!(broker.is_subscribed("KYC_UPDATE", "user-2").await.unwrap());
}

#[tokio::test]
async fn test_blank_keys_rejected() {
    let (_store, broker) = setup(QueueOrder::Lifo).await;

    assert!(matches!(
        broker.subscribe("", "user-1").await,
        Err(NotificationError::InvalidKey(_))
    ));
    assert!(matches!(
        broker.subscribe("KYC_UPDATE", "  ").await,
        Err(NotificationError::InvalidKey(_))
    ));
    assert!(matches!(
        broker.get_details("").await,
        Err(NotificationError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_default_queue_is_last_in_first_out() {
    let (_store, broker) = setup(QueueOrder::default()).await;

    for id in ["P1", "P2", "P3"] {
        broker.push(&json!({ "id": id })).await.unwrap();
    }

    let mut popped = Vec::new();
    while let Some(entry) = broker.pop::<Value>().await.unwrap() {
        popped.push(entry["id"].as_str().unwrap().to_string());
    }
    assert_eq!(popped, vec!["P3", "P2", "P1"]);
}

#[tokio::test]
async fn test_fifo_queue_order() {
    let (_store, broker) = setup(QueueOrder::Fifo).await;

    for id in ["P1", "P2", "P3"] {
        broker.push(&json!({ "id": id })).await.unwrap();
    }

    let first: Value = broker.pop().await.unwrap().unwrap();
    assert_eq!(first["id"], "P1");
}

#[tokio::test]
async fn test_empty_state_reads() {
    let (_store, broker) = setup(QueueOrder::Lifo).await;

    assert!(broker.pop::<Value>().await.unwrap().is_none());
    assert!(broker.get_details("missing").await.unwrap().is_empty());
    assert!(broker.get_notification("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_notification_round_trip_through_queue_and_details() {
    let (_store, broker) = setup(QueueOrder::Lifo).await;

    let notification = Notification::from_event(
        EventData::new("KYC_UPDATE", "user-1")
            .event_id("n-1")
            .reference_id("doc-9")
            .update_details(json!({ "status": "approved" })),
    )
    .unwrap();

    broker.push(&notification).await.unwrap();
    broker
        .store_details(&notification.notification_id, &notification.to_detail_fields().unwrap())
        .await
        .unwrap();

    let popped: Notification = broker.pop().await.unwrap().unwrap();
    assert_eq!(popped, notification);

    let details = broker.get_details("n-1").await.unwrap();
    assert_eq!(details.get("kycDocumentId").map(String::as_str), Some("doc-9"));

    let stored = broker.get_notification("n-1").await.unwrap().unwrap();
    assert_eq!(stored, notification);
}

#[tokio::test]
async fn test_store_details_overwrites_and_ignores_empty() {
    let (_store, broker) = setup(QueueOrder::Lifo).await;

    broker
        .store_details("n-1", &fields(&[("status", "pending"), ("user", "u1")]))
        .await
        .unwrap();
    broker
        .store_details("n-1", &fields(&[("status", "approved")]))
        .await
        .unwrap();
    broker.store_details("n-1", &HashFields::new()).await.unwrap();

    let details = broker.get_details("n-1").await.unwrap();
    assert_eq!(details, fields(&[("status", "approved"), ("user", "u1")]));
}

#[tokio::test]
async fn test_malformed_entry_is_consumed() {
    let (store, broker) = setup(QueueOrder::Lifo).await;

    broker.push(&json!({ "id": "good" })).await.unwrap();
    store.list_push(QUEUE_KEY, "{not json").await.unwrap();

    assert!(matches!(
        broker.pop::<Value>().await,
        Err(NotificationError::MalformedEntry { .. })
    ));
    let next: Value = broker.pop().await.unwrap().unwrap();
    assert_eq!(next["id"], "good");
    assert!(store.list_pop(QUEUE_KEY, ListEnd::Head).await.unwrap().is_none());
}

#[tokio::test]
async fn test_disconnected_store_surfaces_errors() {
    let (store, broker) = setup(QueueOrder::Lifo).await;
    store.close().await;

    assert!(matches!(
        broker.push(&json!({ "id": "x" })).await,
        Err(NotificationError::QueueWrite(_))
    ));
    assert!(matches!(
        broker.subscribe("KYC_UPDATE", "user-1").await,
        Err(NotificationError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_kyc_scenario() {
    let (_store, broker) = setup(QueueOrder::Lifo).await;

    broker.subscribe("KYC_UPDATE", "123").await.unwrap();
    assert!(broker.is_subscribed("KYC_UPDATE", "123").await.unwrap());

    let entry = json!({ "content": "doc submitted", "sender": "User456" });
    broker.push(&entry).await.unwrap();
    assert_eq!(broker.pop::<Value>().await.unwrap(), Some(entry));

    let details = fields(&[("content", "x"), ("sender", "User789")]);
    broker
        .store_details("notification_id_123", &details)
        .await
        .unwrap();
    assert_eq!(broker.get_details("notification_id_123").await.unwrap(), details);
}
