mod settings;

pub use settings::{
    ApiConfig, ListenerConfig, LoggingConfig, RedisConfig, ServerConfig, Settings, StoreConfig,
};
