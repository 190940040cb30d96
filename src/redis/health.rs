//! Redis connection health tracking

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use super::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RedisHealthStatus {
    /// Never connected, or explicitly closed
    Disconnected = 0,
    Healthy = 1,
    /// Connection dropped; the next command reconnects
    Reconnecting = 2,
    CircuitOpen = 3,
}

impl RedisHealthStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RedisHealthStatus::Healthy,
            2 => RedisHealthStatus::Reconnecting,
            3 => RedisHealthStatus::CircuitOpen,
            _ => RedisHealthStatus::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedisHealthStatus::Disconnected => "disconnected",
            RedisHealthStatus::Healthy => "healthy",
            RedisHealthStatus::Reconnecting => "reconnecting",
            RedisHealthStatus::CircuitOpen => "circuit_open",
        }
    }
}

pub struct RedisHealth {
    status: AtomicU8,
    last_connected: AtomicI64,
    total_reconnections: AtomicU32,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RedisHealthStatus::Disconnected as u8),
            last_connected: AtomicI64::new(0),
            total_reconnections: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self) {
        let previous = self.status.swap(RedisHealthStatus::Healthy as u8, Ordering::AcqRel);
        if previous == RedisHealthStatus::Reconnecting as u8 {
            self.total_reconnections.fetch_add(1, Ordering::AcqRel);
        }
        self.last_connected.store(current_time_ms(), Ordering::Release);
    }

    pub fn set_reconnecting(&self) {
        self.status
            .store(RedisHealthStatus::Reconnecting as u8, Ordering::Release);
    }

    pub fn set_circuit_open(&self) {
        self.status
            .store(RedisHealthStatus::CircuitOpen as u8, Ordering::Release);
    }

    pub fn set_disconnected(&self) {
        self.status
            .store(RedisHealthStatus::Disconnected as u8, Ordering::Release);
    }

    pub fn status(&self) -> RedisHealthStatus {
        RedisHealthStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisHealthStatus::Healthy
    }

    pub fn last_connected_ms(&self) -> i64 {
        self.last_connected.load(Ordering::Acquire)
    }

    pub fn total_reconnections(&self) -> u32 {
        self.total_reconnections.load(Ordering::Acquire)
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}
