//! Redis implementation of the backing store.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;

use crate::redis::RedisPool;

use super::{BackingStore, HashFields, ListEnd, StoreError, StoreHealth, Subscription};

pub struct RedisStore {
    pool: Arc<RedisPool>,
}

impl RedisStore {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }
}

#[async_trait]
impl BackingStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.pool.connect().await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn is_connected(&self) -> bool {
        self.pool.is_open()
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        let added = self
            .pool
            .execute(|mut conn| async move {
                let added: i64 = conn.sadd(&key, &member).await?;
                Ok::<_, redis::RedisError>(added > 0)
            })
            .await?;
        Ok(added)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        let removed = self
            .pool
            .execute(|mut conn| async move {
                let removed: i64 = conn.srem(&key, &member).await?;
                Ok::<_, redis::RedisError>(removed > 0)
            })
            .await?;
        Ok(removed)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let (key, member) = (key.to_string(), member.to_string());
        let present = self
            .pool
            .execute(|mut conn| async move {
                let present: bool = conn.sismember(&key, &member).await?;
                Ok::<_, redis::RedisError>(present)
            })
            .await?;
        Ok(present)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.pool
            .execute(|mut conn| async move {
                let _: i64 = conn.lpush(&key, &value).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await?;
        Ok(())
    }

    async fn list_pop(&self, key: &str, end: ListEnd) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        let value = self
            .pool
            .execute(|mut conn| async move {
                let value: Option<String> = match end {
                    ListEnd::Head => conn.lpop(&key, None).await?,
                    ListEnd::Tail => conn.rpop(&key, None).await?,
                };
                Ok::<_, redis::RedisError>(value)
            })
            .await?;
        Ok(value)
    }

    async fn hash_set(&self, key: &str, fields: &HashFields) -> Result<(), StoreError> {
        if fields.is_empty() {
            // HSET without fields is a Redis syntax error
            return Ok(());
        }

        let key = key.to_string();
        let items: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.pool
            .execute(|mut conn| async move {
                let _: () = conn.hset_multiple(&key, &items).await?;
                Ok::<_, redis::RedisError>(())
            })
            .await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashFields, StoreError> {
        let key = key.to_string();
        let fields = self
            .pool
            .execute(|mut conn| async move {
                let fields: HashFields = conn.hgetall(&key).await?;
                Ok::<_, redis::RedisError>(fields)
            })
            .await?;
        Ok(fields)
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<usize, StoreError> {
        let (topic, message) = (topic.to_string(), message.to_string());
        let receivers = self
            .pool
            .execute(|mut conn| async move {
                let receivers: i64 = conn.publish(&topic, &message).await?;
                Ok::<_, redis::RedisError>(receivers)
            })
            .await?;
        Ok(receivers.max(0) as usize)
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = self.pool.pubsub().await?;
        pubsub.subscribe(topic).await?;
        tracing::debug!(topic = %topic, "Redis subscription established");

        // The stream owns the Pub/Sub connection; dropping it disconnects,
        // which unsubscribes server-side.
        let messages = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload::<String>().map_err(StoreError::from))
            .boxed();

        Ok(Subscription::new(topic, messages))
    }

    async fn health(&self) -> StoreHealth {
        let status = self.pool.health().status();
        StoreHealth {
            backend: self.backend_name(),
            connected: self.pool.is_open() && self.pool.health().is_healthy(),
            status: status.as_str().to_string(),
            circuit_state: Some(self.pool.circuit_state().as_str().to_string()),
        }
    }
}
