//! Backing store factory

use std::sync::Arc;

use crate::config::{RedisConfig, StoreConfig};
use crate::redis::{PoolError, RedisPool};

use super::memory::MemoryStore;
use super::redis_store::RedisStore;
use super::BackingStore;

/// Create the backing store named by `store.backend`.
///
/// - `"memory"`: in-process store, nothing survives a restart
/// - anything else: Redis at `redis.url`
///
/// The returned store is not connected yet; its owner calls `connect` and
/// later `close`.
pub fn create_store(
    store: &StoreConfig,
    redis: &RedisConfig,
) -> Result<Arc<dyn BackingStore>, PoolError> {
    match store.backend.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory backing store");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => {
            if other != "redis" {
                tracing::warn!(backend = %other, "Unknown store backend, using redis");
            }
            tracing::info!(backend = "redis", "Creating Redis backing store");
            let pool = Arc::new(RedisPool::new(redis)?);
            Ok(Arc::new(RedisStore::new(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_selected() {
        let store_config = StoreConfig {
            backend: "memory".to_string(),
            ..StoreConfig::default()
        };
        let store = create_store(&store_config, &RedisConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(!store.is_connected());
    }

    #[test]
    fn test_redis_backend_selected_by_default() {
        let store = create_store(&StoreConfig::default(), &RedisConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "redis");
    }
}
