//! Shared Redis connection for store commands.
//!
//! Commands go through one multiplexed connection guarded by the circuit
//! breaker. Pub/Sub needs its own connection per subscription, handed out by
//! [`RedisPool::pubsub`]. The pool has an explicit lifecycle: nothing runs
//! before [`RedisPool::connect`] or after [`RedisPool::close`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use redis::aio::{MultiplexedConnection, PubSub};
use redis::{Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RedisHealth};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Redis pool is not connected")]
    Closed,
}

pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    /// Set by `connect`, cleared by `close`
    open: AtomicBool,
    circuit_breaker: CircuitBreaker,
    health: RedisHealth,
}

impl RedisPool {
    /// Create a pool for the configured URL. No connection is made yet.
    pub fn new(config: &RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            open: AtomicBool::new(false),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::from(config)),
            health: RedisHealth::new(),
        })
    }

    /// Open the pool and establish the command connection.
    pub async fn connect(&self) -> Result<(), PoolError> {
        self.open.store(true, Ordering::Release);
        if let Err(e) = self.establish().await {
            self.open.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Close the pool and drop the command connection.
    pub async fn close(&self) {
        self.open.store(false, Ordering::Release);
        let previous = self.connection.write().await.take();
        self.health.set_disconnected();
        if previous.is_some() {
            tracing::info!("Redis pool connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.is_open() {
            return Err(PoolError::Closed);
        }

        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.establish().await
    }

    async fn establish(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.circuit_breaker.record_success();
                self.health.set_connected();
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                self.health.set_reconnecting();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Run one command on the shared connection, recording the outcome on
    /// the circuit breaker. A dropped connection is discarded so the next
    /// command reconnects.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() {
                    *self.connection.write().await = None;
                    self.health.set_reconnecting();
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Open a dedicated Pub/Sub connection.
    pub async fn pubsub(&self) -> Result<PubSub, PoolError> {
        if !self.is_open() {
            return Err(PoolError::Closed);
        }
        if !self.circuit_breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        match self.client.get_async_pubsub().await {
            Ok(pubsub) => {
                self.circuit_breaker.record_success();
                Ok(pubsub)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn health(&self) -> &RedisHealth {
        &self.health
    }
}
