//! MQTT transport (C12): wraps `rumqttc`'s `AsyncClient`/`EventLoop` pair,
//! feeding inbound publishes into `gateway_core::Pipeline::process_frame`
//! and draining `PipelineEvent::RelayMessage` back out onto the broker.
//!
//! The wildcard matching and subscription bookkeeping stay in
//! `gateway_core::mqtt` (transport-free); this module only owns the actual
//! socket.

use std::sync::Arc;
use std::time::Duration;

use canon_protocol::RawFrame;
use gateway_core::{Pipeline, PipelineEvent};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{error, info, warn};

use crate::config::MqttConfig;

#[derive(Debug, thiserror::Error)]
pub enum MqttAdapterError {
    #[error("invalid broker url {0:?}: {1}")]
    InvalidUrl(String, String),
    #[error("subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),
}

/// Splits a `tcp://host:port`-style URL into the host/port pair
/// `rumqttc::MqttOptions::new` expects. Defaults to 1883 when no port is
/// given, matching the standard unencrypted MQTT port.
fn parse_broker_url(url: &str) -> Result<(String, u16), MqttAdapterError> {
    let without_scheme = url.split("://").next_back().unwrap_or(url);
    let mut parts = without_scheme.splitn(2, ':');
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MqttAdapterError::InvalidUrl(url.to_string(), "missing host".to_string()))?;
    let port = match parts.next() {
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| MqttAdapterError::InvalidUrl(url.to_string(), e.to_string()))?,
        None => 1883,
    };
    Ok((host.to_string(), port))
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

pub struct MqttAdapter {
    client: AsyncClient,
}

impl MqttAdapter {
    /// Connects, subscribes to every configured topic, and spawns the two
    /// background tasks: the inbound poll loop (feeding the pipeline) and
    /// the relay-forwarding loop (draining `PipelineEvent`s back out).
    pub async fn connect(
        cfg: &MqttConfig,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self, MqttAdapterError> {
        let (host, port) = parse_broker_url(&cfg.url)?;
        let mut mqtt_options = MqttOptions::new(cfg.client_id.clone(), host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        let (client, event_loop) = AsyncClient::new(mqtt_options, 256);
        let qos = qos_from_u8(cfg.qos);
        for topic in &cfg.topics {
            client.subscribe(topic, qos).await?;
            info!(topic, "subscribed");
        }

        tokio::spawn(poll_loop(event_loop, Arc::clone(&pipeline)));
        tokio::spawn(relay_loop(client.clone(), pipeline));

        Ok(Self { client })
    }

    pub async fn shutdown(&self) {
        self.client.disconnect().await.ok();
    }
}

/// Drives the event loop forever, decoding each inbound publish through the
/// pipeline. `rumqttc` reconnects internally on the next `poll()` call after
/// a transient error, so a poll error here is logged and retried rather than
/// treated as fatal — matching `mqtt.options.reconnectPeriod` semantics.
async fn poll_loop(mut event_loop: rumqttc::EventLoop, pipeline: Arc<Pipeline>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let frame = RawFrame::new(publish.topic.clone(), publish.payload);
                pipeline.process_frame(frame).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "mqtt event loop error, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Subscribes to the pipeline's event bus and republishes
/// `PipelineEvent::RelayMessage`s onto the broker (spec §4.8's relay output
/// side).
async fn relay_loop(client: AsyncClient, pipeline: Arc<Pipeline>) {
    let mut events = pipeline.subscribe_events();
    loop {
        match events.recv().await {
            Ok(PipelineEvent::RelayMessage { topic, payload }) => {
                if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
                    error!(topic, error = %e, "relay publish failed");
                }
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "relay loop lagged behind pipeline event bus");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_and_port() {
        assert_eq!(parse_broker_url("tcp://broker.local:1883").unwrap(), ("broker.local".to_string(), 1883));
    }

    #[test]
    fn defaults_port_when_absent() {
        assert_eq!(parse_broker_url("tcp://broker.local").unwrap(), ("broker.local".to_string(), 1883));
    }

    #[test]
    fn rejects_empty_host() {
        assert!(parse_broker_url("tcp://").is_err());
    }

    #[test]
    fn qos_maps_to_expected_variants() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        assert_eq!(qos_from_u8(9), QoS::AtLeastOnce);
    }
}
