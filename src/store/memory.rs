//! In-process backing store.
//!
//! Mirrors the observable Redis semantics the core depends on (empty
//! collections disappear, type mismatches are errors, publish reaches only
//! current subscribers) without any persistence across restarts.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::{BackingStore, HashFields, ListEnd, StoreError, StoreHealth, Subscription};

/// Per-topic buffer; slower subscribers skip ahead once it overflows
const TOPIC_CAPACITY: usize = 1024;

enum Value {
    Set(HashSet<String>),
    List(VecDeque<String>),
    Hash(HashFields),
}

pub struct MemoryStore {
    data: DashMap<String, Value>,
    topics: DashMap<String, broadcast::Sender<String>>,
    connected: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            topics: DashMap::new(),
            connected: AtomicBool::new(false),
        }
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType(key.to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.connected.store(true, Ordering::Release);
        tracing::debug!("Memory store connected");
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        // Dropping the senders ends every open subscription stream
        self.topics.clear();
        tracing::debug!("Memory store closed");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()));
        match entry.value_mut() {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        let (removed, now_empty) = match self.data.get_mut(key) {
            None => return Ok(false),
            Some(mut entry) => match entry.value_mut() {
                Value::Set(set) => {
                    let removed = set.remove(member);
                    (removed, set.is_empty())
                }
                _ => return Err(Self::wrong_type(key)),
            },
        };

        if now_empty {
            self.data
                .remove_if(key, |_, v| matches!(v, Value::Set(set) if set.is_empty()));
        }
        Ok(removed)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.ensure_connected()?;
        match self.data.get(key) {
            None => Ok(false),
            Some(entry) => match entry.value() {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match entry.value_mut() {
            Value::List(list) => {
                list.push_front(value.to_string());
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn list_pop(&self, key: &str, end: ListEnd) -> Result<Option<String>, StoreError> {
        self.ensure_connected()?;
        let (popped, now_empty) = match self.data.get_mut(key) {
            None => return Ok(None),
            Some(mut entry) => match entry.value_mut() {
                Value::List(list) => {
                    let popped = match end {
                        ListEnd::Head => list.pop_front(),
                        ListEnd::Tail => list.pop_back(),
                    };
                    (popped, list.is_empty())
                }
                _ => return Err(Self::wrong_type(key)),
            },
        };

        if now_empty {
            self.data
                .remove_if(key, |_, v| matches!(v, Value::List(list) if list.is_empty()));
        }
        Ok(popped)
    }

    async fn hash_set(&self, key: &str, fields: &HashFields) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashFields::new()));
        match entry.value_mut() {
            Value::Hash(hash) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields, StoreError> {
        self.ensure_connected()?;
        match self.data.get(key) {
            None => Ok(HashFields::new()),
            Some(entry) => match entry.value() {
                Value::Hash(hash) => Ok(hash.clone()),
                _ => Err(Self::wrong_type(key)),
            },
        }
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<usize, StoreError> {
        self.ensure_connected()?;
        let receivers = match self.topics.get(topic) {
            // send only fails when nobody is listening
            Some(sender) => sender.send(message.to_string()).unwrap_or(0),
            None => 0,
        };
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        self.ensure_connected()?;
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let topic_name = topic.to_string();
        let messages = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let topic_name = topic_name.clone();
                async move {
                    match item {
                        Ok(message) => Some(Ok(message)),
                        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                topic = %topic_name,
                                skipped,
                                "Subscriber lagged behind, messages skipped"
                            );
                            None
                        }
                    }
                }
            })
            .boxed();

        Ok(Subscription::new(topic, messages))
    }

    async fn health(&self) -> StoreHealth {
        let connected = self.is_connected();
        StoreHealth {
            backend: self.backend_name(),
            connected,
            status: if connected { "healthy" } else { "disconnected" }.to_string(),
            circuit_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.connect().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_operations_fail_while_disconnected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_add("s", "a").await,
            Err(StoreError::Disconnected)
        ));

        store.connect().await.unwrap();
        store.list_push("l", "x").await.unwrap();
        store.close().await;

        assert!(matches!(
            store.list_pop("l", ListEnd::Head).await,
            Err(StoreError::Disconnected)
        ));
        assert!(matches!(
            store.publish("t", "m").await,
            Err(StoreError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_set_semantics() {
        let store = connected_store().await;
        assert!(store.set_add("s", "a").await.unwrap());
        assert!(!store.set_add("s", "a").await.unwrap());
        assert!(store.set_contains("s", "a").await.unwrap());

        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_remove("s", "a").await.unwrap());
        assert!(store.data.get("s").is_none());
    }

    #[tokio::test]
    async fn test_list_ends() {
        let store = connected_store().await;
        for value in ["1", "2", "3"] {
            store.list_push("l", value).await.unwrap();
        }

        assert_eq!(store.list_pop("l", ListEnd::Head).await.unwrap().as_deref(), Some("3"));
        assert_eq!(store.list_pop("l", ListEnd::Tail).await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.list_pop("l", ListEnd::Head).await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.list_pop("l", ListEnd::Head).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_overwrites_fields() {
        let store = connected_store().await;
        let mut fields = HashFields::new();
        fields.insert("a".into(), "1".into());
        fields.insert("b".into(), "2".into());
        store.hash_set("h", &fields).await.unwrap();

        let mut update = HashFields::new();
        update.insert("b".into(), "3".into());
        store.hash_set("h", &update).await.unwrap();

        let stored = store.hash_get_all("h").await.unwrap();
        assert_eq!(stored.get("a").map(String::as_str), Some("1"));
        assert_eq!(stored.get("b").map(String::as_str), Some("3"));
        assert!(store.hash_get_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = connected_store().await;
        store.list_push("k", "v").await.unwrap();
        assert!(matches!(
            store.set_add("k", "m").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_reaches_current_subscribers_only() {
        let store = connected_store().await;
        assert_eq!(store.publish("t", "early").await.unwrap(), 0);

        let mut subscription = store.subscribe("t").await.unwrap();
        assert_eq!(store.publish("t", "one").await.unwrap(), 1);
        assert_eq!(store.publish("t", "two").await.unwrap(), 1);

        assert_eq!(subscription.next_message().await.unwrap().unwrap(), "one");
        assert_eq!(subscription.next_message().await.unwrap().unwrap(), "two");

        drop(subscription);
        assert_eq!(store.publish("t", "late").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let store = connected_store().await;
        let mut subscription = store.subscribe("t").await.unwrap();
        store.close().await;
        assert!(subscription.next_message().await.is_none());
    }
}
