// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod store;

// Domain
pub mod channel;
pub mod notification;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
