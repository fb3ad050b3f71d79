//! Ingest service: wires the transport-free `gateway-core` pipeline to a
//! real MQTT broker and an optional Postgres write sink. `main.rs` is just
//! startup/shutdown sequencing; everything else lives here so it can be
//! exercised from tests without a `#[tokio::main]` binary.

pub mod config;
pub mod db;
pub mod mqtt_adapter;

use std::sync::Arc;
use std::time::Duration;

use gateway_core::{MessageRelay, Pipeline, PipelineConfig, RelayError, WriteBufferConfig, WriteSink};

use crate::config::MiddlewareConfig;
use crate::mqtt_adapter::{MqttAdapter, MqttAdapterError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid relay config: {0}")]
    Relay(#[from] RelayError),
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("mqtt adapter failed: {0}")]
    Mqtt(#[from] MqttAdapterError),
}

/// Builds the relay, optionally connects the database sink, and constructs
/// the pipeline. Does not start it — call `Pipeline::run` and
/// `MqttAdapter::connect` separately, matching the teacher's "build, then
/// start" two-phase startup.
pub async fn build_pipeline(config: &MiddlewareConfig) -> Result<Arc<Pipeline>, IngestError> {
    let relay = if config.message_relay.enabled {
        MessageRelay::from_config(
            config.message_relay.patterns.clone(),
            config.message_relay.topic_prefix.clone(),
        )?
    } else {
        MessageRelay::new()
    };

    let sink: Option<Arc<dyn WriteSink>> = if config.database.enabled {
        let conn_str = db::connection_string(&config.database.pool);
        let pool = db::connect(&conn_str, config.database.pool.connection_limit).await?;
        Some(Arc::new(db::PgWriteSink::new(pool)))
    } else {
        None
    };

    let pipeline_config = PipelineConfig {
        cache_max_size: config.cache.max_size,
        cache_ttl: Duration::from_millis(config.cache.ttl_ms),
        write_buffer: WriteBufferConfig {
            max_size: config.write_buffer.max_size,
            flush_interval: Duration::from_millis(config.write_buffer.flush_interval_ms),
            max_retries: config.write_buffer.max_retries,
        },
        ..PipelineConfig::default()
    };

    Ok(Pipeline::new(sink, relay, pipeline_config))
}

/// Starts the pipeline's background tasks and connects the MQTT transport.
/// Returns the adapter so the caller can shut it down on signal.
pub async fn start(config: &MiddlewareConfig, pipeline: &Arc<Pipeline>) -> Result<MqttAdapter, IngestError> {
    pipeline.run().await.map_err(|e| {
        // Pipeline::run only fails on a double-start, which a single
        // `main.rs` invocation can never trigger.
        unreachable!("pipeline already running: {e}")
    })?;
    let adapter = MqttAdapter::connect(&config.mqtt, Arc::clone(pipeline)).await?;
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_pipeline_without_database_has_no_sink() {
        let cfg = config::load_config_from_str(
            "[mqtt]\nurl = \"tcp://localhost:1883\"\ntopics = [\"FamilyB/#\"]\n",
        )
        .unwrap();
        let pipeline = build_pipeline(&cfg).await.unwrap();
        assert_eq!(pipeline.write_buffer_stats().pending, 0);
    }

    #[tokio::test]
    async fn build_pipeline_with_relay_rule_routes_traffic() {
        let cfg = config::load_config_from_str(
            "[mqtt]\nurl = \"tcp://localhost:1883\"\ntopics = [\"FamilyB/#\"]\n\
             [message_relay]\nenabled = true\ntopic_prefix = \"new/\"\n\
             [message_relay.patterns]\nFamilyB = \"new/${gatewayId}/TemHum\"\n",
        )
        .unwrap();
        let pipeline = build_pipeline(&cfg).await.unwrap();
        let mut events = pipeline.subscribe_events();
        let bytes = [0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, 0x1B, 0x29, 0x38, 0x35, 0x35, 0x01, 0x9E, 0x28];
        pipeline
            .process_frame(canon_protocol::RawFrame::new(
                "FamilyB/GW1/TemHum",
                bytes::Bytes::copy_from_slice(&bytes),
            ))
            .await;
        let mut saw_relay = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, gateway_core::PipelineEvent::RelayMessage { .. }) {
                saw_relay = true;
            }
        }
        assert!(saw_relay);
    }
}
