//! Backing store abstraction.
//!
//! The notification core treats its key-value/messaging store as an external
//! collaborator. [`BackingStore`] is the full contract the core relies on:
//! sets for subscriptions, a list for the durable queue, hashes for detail
//! records and a topic-based Pub/Sub primitive. Each call is atomic on its own;
//! nothing spans more than one call.

mod factory;
pub mod keys;
mod memory;
mod redis_store;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;

pub use factory::create_store;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::redis::PoolError;

/// Field name to value mapping stored in a hash.
pub type HashFields = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was never connected or has been closed
    #[error("store is not connected")]
    Disconnected,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("key {0} holds a value of another type")]
    WrongType(String),

    #[error("subscription stream failed: {0}")]
    Subscription(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => StoreError::Redis(e),
            PoolError::CircuitOpen => StoreError::CircuitOpen,
            PoolError::Closed => StoreError::Disconnected,
        }
    }
}

/// End of a list a value is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Head,
    Tail,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub backend: &'static str,
    pub connected: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<String>,
}

/// A live subscription to one topic.
///
/// Messages arrive in publish order. Dropping the subscription unsubscribes
/// and releases whatever connection backs it.
pub struct Subscription {
    topic: String,
    messages: BoxStream<'static, Result<String, StoreError>>,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        messages: BoxStream<'static, Result<String, StoreError>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next published payload, or `None` once the stream has ended.
    pub async fn next_message(&mut self) -> Option<Result<String, StoreError>> {
        self.messages.next().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(topic = %self.topic, "Subscription released");
    }
}

#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;

    async fn connect(&self) -> Result<(), StoreError>;

    async fn close(&self);

    fn is_connected(&self) -> bool;

    /// Add a member to a set. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member from a set. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Insert a value at the head of a list.
    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove and return the value at one end of a list.
    async fn list_pop(&self, key: &str, end: ListEnd) -> Result<Option<String>, StoreError>;

    /// Set (or overwrite) fields of a hash.
    async fn hash_set(&self, key: &str, fields: &HashFields) -> Result<(), StoreError>;

    /// All fields of a hash; empty when the key is unknown.
    async fn hash_get_all(&self, key: &str) -> Result<HashFields, StoreError>;

    /// Broadcast a message. Returns how many subscribers received it.
    async fn publish(&self, topic: &str, message: &str) -> Result<usize, StoreError>;

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError>;

    async fn health(&self) -> StoreHealth;
}
