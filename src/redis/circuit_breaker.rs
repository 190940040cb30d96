//! Circuit breaker guarding Redis commands.
//!
//! After `failure_threshold` consecutive failures every command is rejected
//! up front until `reset_timeout` has passed; the breaker then lets probe
//! commands through and closes again after `success_threshold` successes.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use crate::config::RedisConfig;

use super::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RedisConfig> for CircuitBreakerConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold.max(1),
            success_threshold: config.circuit_breaker_success_threshold.max(1),
            reset_timeout: Duration::from_secs(config.circuit_breaker_reset_timeout_seconds),
        }
    }
}

pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    successes: AtomicU32,
    /// ms since epoch of the last transition
    changed_at: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            changed_at: AtomicI64::new(current_time_ms()),
            config,
        }
    }

    /// Current state, promoting Open to HalfOpen once the reset timeout elapsed
    pub fn state(&self) -> CircuitState {
        let raw = CircuitState::from_u8(self.state.load(Ordering::Acquire));
        if raw != CircuitState::Open {
            return raw;
        }

        let elapsed = current_time_ms() - self.changed_at.load(Ordering::Acquire);
        if elapsed < self.config.reset_timeout.as_millis() as i64 {
            return CircuitState::Open;
        }

        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.successes.store(0, Ordering::Release);
            self.changed_at.store(current_time_ms(), Ordering::Release);
            tracing::info!("Redis circuit breaker half-open, probing");
        }

        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from_u8(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                    tracing::info!("Redis circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from_u8(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                    tracing::warn!(failures, "Redis circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open);
                tracing::warn!("Redis circuit breaker reopened after failed probe");
            }
            CircuitState::Open => self.changed_at.store(current_time_ms(), Ordering::Release),
        }
    }

    fn transition(&self, next: CircuitState) {
        self.state.store(next as u8, Ordering::Release);
        self.changed_at.store(current_time_ms(), Ordering::Release);
        self.successes.store(0, Ordering::Release);
        if next == CircuitState::Closed {
            self.failures.store(0, Ordering::Release);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
