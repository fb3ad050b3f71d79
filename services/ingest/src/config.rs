//! Ingest service configuration loading.
//!
//! TOML is the sole config source. Default config path:
//! `/etc/rack-telemetry/ingest.toml`.
//!
//! # Required fields
//! - `mqtt.url`
//! - At least one `mqtt.topics` entry
//!
//! Everything else has a default matching the middleware's documented
//! defaults (write buffer, cache, relay, callbacks, server, logger).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    pub write_buffer: WriteBufferConfig,
    pub cache: CacheConfig,
    pub message_relay: MessageRelayConfig,
    pub callbacks: CallbacksConfig,
    pub server: ServerConfig,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub url: String,
    pub topics: Vec<String>,
    pub qos: u8,
    pub reconnect_period_ms: u64,
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub pool: DbPoolConfig,
}

#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connection_limit: u32,
    pub wait_for_connections: bool,
    pub queue_limit: u32,
}

#[derive(Debug, Clone)]
pub struct WriteBufferConfig {
    pub max_size: usize,
    pub flush_interval_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MessageRelayConfig {
    pub enabled: bool,
    /// category → target template (e.g. `"FamilyB" -> "new/${gatewayId}/TemHum"`).
    pub patterns: HashMap<String, String>,
    pub topic_prefix: String,
}

#[derive(Debug, Clone)]
pub struct CallbacksConfig {
    pub enabled: bool,
    pub retry_limit: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (all-Option)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    mqtt: Option<RawMqttConfig>,
    database: Option<RawDatabaseConfig>,
    write_buffer: Option<RawWriteBufferConfig>,
    cache: Option<RawCacheConfig>,
    message_relay: Option<RawMessageRelayConfig>,
    callbacks: Option<RawCallbacksConfig>,
    server: Option<RawServerConfig>,
    logger: Option<RawLoggerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawMqttConfig {
    url: Option<String>,
    topics: Option<Vec<String>>,
    qos: Option<u8>,
    reconnect_period_ms: Option<u64>,
    client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabaseConfig {
    enabled: Option<bool>,
    connection_pool: Option<RawDbPoolConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDbPoolConfig {
    host: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    connection_limit: Option<u32>,
    wait_for_connections: Option<bool>,
    queue_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWriteBufferConfig {
    max_size: Option<usize>,
    flush_interval: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCacheConfig {
    max_size: Option<usize>,
    ttl: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessageRelayConfig {
    enabled: Option<bool>,
    patterns: Option<HashMap<String, String>>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCallbacksConfig {
    enabled: Option<bool>,
    retry_limit: Option<u32>,
    retry_delay: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServerConfig {
    host: Option<String>,
    port: Option<u16>,
    rate_limit: Option<RawRateLimitConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRateLimitConfig {
    window_ms: Option<u64>,
    max_requests: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLoggerConfig {
    level: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<MiddlewareConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<MiddlewareConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/rack-telemetry/ingest.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<MiddlewareConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let raw_mqtt = raw.mqtt.ok_or_else(|| ConfigError::MissingField("mqtt".to_owned()))?;
    let url = raw_mqtt.url.ok_or_else(|| ConfigError::MissingField("mqtt.url".to_owned()))?;
    let topics = raw_mqtt.topics.unwrap_or_default();
    if topics.is_empty() {
        return Err(ConfigError::InvalidValue("mqtt.topics must have at least one entry".to_owned()));
    }
    let qos = raw_mqtt.qos.unwrap_or(1);
    if qos > 2 {
        return Err(ConfigError::InvalidValue(format!("mqtt.qos must be 0, 1 or 2, got {qos}")));
    }
    let mqtt = MqttConfig {
        url,
        topics,
        qos,
        reconnect_period_ms: raw_mqtt.reconnect_period_ms.unwrap_or(5000),
        client_id: raw_mqtt.client_id.unwrap_or_else(|| "rack-telemetry-ingest".to_owned()),
    };

    let raw_db = raw.database.unwrap_or_default();
    let raw_pool = raw_db.connection_pool.unwrap_or_default();
    let database = DatabaseConfig {
        enabled: raw_db.enabled.unwrap_or(false),
        pool: DbPoolConfig {
            host: raw_pool.host.unwrap_or_else(|| "localhost".to_owned()),
            user: raw_pool.user.unwrap_or_else(|| "postgres".to_owned()),
            password: raw_pool.password.unwrap_or_default(),
            database: raw_pool.database.unwrap_or_else(|| "rack_telemetry".to_owned()),
            connection_limit: raw_pool.connection_limit.unwrap_or(10),
            wait_for_connections: raw_pool.wait_for_connections.unwrap_or(true),
            queue_limit: raw_pool.queue_limit.unwrap_or(0),
        },
    };

    let raw_wb = raw.write_buffer.unwrap_or_default();
    let write_buffer = WriteBufferConfig {
        max_size: raw_wb.max_size.unwrap_or(1000),
        flush_interval_ms: raw_wb.flush_interval.unwrap_or(5000),
        max_retries: raw_wb.max_retries.unwrap_or(3),
    };

    let raw_cache = raw.cache.unwrap_or_default();
    let cache = CacheConfig {
        max_size: raw_cache.max_size.unwrap_or(10_000),
        ttl_ms: raw_cache.ttl.unwrap_or(3_600_000),
    };

    let raw_relay = raw.message_relay.unwrap_or_default();
    let message_relay = MessageRelayConfig {
        enabled: raw_relay.enabled.unwrap_or(false),
        patterns: raw_relay.patterns.unwrap_or_default(),
        topic_prefix: raw_relay.topic_prefix.unwrap_or_else(|| "new/".to_owned()),
    };

    let raw_callbacks = raw.callbacks.unwrap_or_default();
    let callbacks = CallbacksConfig {
        enabled: raw_callbacks.enabled.unwrap_or(false),
        retry_limit: raw_callbacks.retry_limit.unwrap_or(3),
        retry_delay_ms: raw_callbacks.retry_delay.unwrap_or(1000),
    };

    let raw_server = raw.server.unwrap_or_default();
    let raw_rate_limit = raw_server.rate_limit.unwrap_or_default();
    let server = ServerConfig {
        host: raw_server.host.unwrap_or_else(|| "0.0.0.0".to_owned()),
        port: raw_server.port.unwrap_or(8080),
        rate_limit: RateLimitConfig {
            window_ms: raw_rate_limit.window_ms.unwrap_or(60_000),
            max_requests: raw_rate_limit.max_requests.unwrap_or(100),
        },
    };

    let raw_logger = raw.logger.unwrap_or_default();
    let level = raw_logger.level.unwrap_or_else(|| "info".to_owned());
    if !["debug", "info", "warn", "error"].contains(&level.as_str()) {
        return Err(ConfigError::InvalidValue(format!(
            "logger.level must be one of debug/info/warn/error, got '{level}'"
        )));
    }
    let logger = LoggerConfig { level };

    Ok(MiddlewareConfig {
        mqtt,
        database,
        write_buffer,
        cache,
        message_relay,
        callbacks,
        server,
        logger,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
