//! Redis connection management
//!
//! - `RedisPool`: shared command connection with explicit connect/close
//! - `CircuitBreaker`: rejects commands while Redis keeps failing
//! - `ExponentialBackoff`: reconnect delays for the live listener
//! - `RedisHealth`: connection status reported by `/health`

mod backoff;
mod circuit_breaker;
mod health;
pub mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health::{RedisHealth, RedisHealthStatus};
pub use pool::{PoolError, RedisPool};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
