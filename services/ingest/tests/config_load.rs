//! Integration tests for ingest config loading: defaults, required fields,
//! and relay pattern parsing, exercised the way forwarder's
//! `tests/config_load.rs` does it (against the public loader, not internals).

use ingest::config::{load_config_from_path, ConfigError};
use std::io::Write;

fn write_config(toml: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp file");
    write!(f, "{toml}").expect("write config");
    f
}

#[test]
fn valid_minimal_config_loads_with_defaults() {
    let file = write_config(
        r#"
        [mqtt]
        url = "tcp://broker.local:1883"
        topics = ["FamilyB/#", "FamilyT/#"]
        "#,
    );
    let cfg = load_config_from_path(file.path()).expect("config should load");
    assert_eq!(cfg.mqtt.topics, vec!["FamilyB/#".to_string(), "FamilyT/#".to_string()]);
    assert_eq!(cfg.write_buffer.max_size, 1000);
    assert_eq!(cfg.write_buffer.flush_interval_ms, 5000);
    assert_eq!(cfg.cache.max_size, 10_000);
    assert!(!cfg.message_relay.enabled);
    assert_eq!(cfg.server.port, 8080);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_config_from_path(std::path::Path::new("/nonexistent/ingest.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn full_config_overrides_every_default() {
    let file = write_config(
        r#"
        [mqtt]
        url = "tcp://broker.local:1884"
        topics = ["FamilyB/#"]
        qos = 2
        reconnect_period_ms = 2000
        client_id = "test-ingest"

        [database]
        enabled = true
        [database.connection_pool]
        host = "db.local"
        user = "ingest_user"
        password = "hunter2"
        database = "telemetry"
        connection_limit = 25

        [write_buffer]
        max_size = 50
        flush_interval = 1000
        max_retries = 5

        [cache]
        max_size = 500
        ttl = 60000

        [callbacks]
        enabled = true
        retry_limit = 4
        retry_delay = 2000

        [server]
        host = "127.0.0.1"
        port = 9090
        [server.rate_limit]
        window_ms = 1000
        max_requests = 10

        [logger]
        level = "debug"
        "#,
    );
    let cfg = load_config_from_path(file.path()).expect("config should load");
    assert_eq!(cfg.mqtt.qos, 2);
    assert!(cfg.database.enabled);
    assert_eq!(cfg.database.pool.host, "db.local");
    assert_eq!(cfg.write_buffer.max_size, 50);
    assert_eq!(cfg.cache.ttl_ms, 60_000);
    assert!(cfg.callbacks.enabled);
    assert_eq!(cfg.server.port, 9090);
    assert_eq!(cfg.logger.level, "debug");
}
