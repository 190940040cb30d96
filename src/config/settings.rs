use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::notification::QueueOrder;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    /// Successful probes in half-open state before the circuit closes
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    /// Seconds the circuit stays open before probing again
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
    /// Initial reconnect delay for the live listener
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_delay_ms: u64,
    /// Upper bound for the live listener reconnect delay
    #[serde(default = "default_backoff_max")]
    pub backoff_max_delay_ms: u64,
}

/// Backing store selection and queue semantics
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "redis" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default)]
    pub queue_order: QueueOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Longest a single handler may take on one message
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_backoff_initial() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_store_backend() -> String {
    "redis".to_string()
}

fn default_true() -> bool {
    true
}

fn default_topic() -> String {
    crate::store::keys::NOTIFICATION_CHANNEL.to_string()
}

fn default_handler_timeout_ms() -> u64 {
    5_000
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("redis.url", default_redis_url())?
            .set_default("store.backend", default_store_backend())?
            .set_default("store.queue_order", "lifo")?
            .set_default("listener.enabled", true)?
            .set_default("listener.topic", default_topic())?
            .set_default("listener.handler_timeout_ms", default_handler_timeout_ms())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APP_REDIS__URL, APP_STORE__QUEUE_ORDER, APP_API__KEY, ...
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
            backoff_initial_delay_ms: default_backoff_initial(),
            backoff_max_delay_ms: default_backoff_max(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            queue_order: QueueOrder::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: default_topic(),
            handler_timeout_ms: default_handler_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8090);

        let store = StoreConfig::default();
        assert_eq!(store.backend, "redis");
        assert_eq!(store.queue_order, QueueOrder::Lifo);

        let listener = ListenerConfig::default();
        assert!(listener.enabled);
        assert_eq!(listener.topic, "notification:channel");
        assert_eq!(listener.handler_timeout_ms, 5_000);
    }

    #[test]
    fn test_queue_order_from_config_value() {
        let store: StoreConfig =
            serde_json::from_str(r#"{"backend": "memory", "queue_order": "fifo"}"#).unwrap();
        assert_eq!(store.backend, "memory");
        assert_eq!(store.queue_order, QueueOrder::Fifo);
    }
}
