//! Gateway traffic emulator (C16): publishes synthetic family-B and
//! family-T frames to an MQTT broker on a fixed schedule, so the ingest
//! pipeline can be exercised without real rack hardware. Adapted from the
//! teacher's chip-read emulator (`services/emulator`), generating frames
//! from a counter instead of reading a capture file — there is no capture
//! format for this protocol to replay.

use std::convert::TryFrom;
use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadType {
    /// Family-B `TemHum` frames only.
    TempHum,
    /// Family-T RFID attach/detach notifications only.
    Rfid,
    /// Alternates between both families every tick.
    Mixed,
}

impl TryFrom<&str> for ReadType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "temp_hum" => Ok(ReadType::TempHum),
            "rfid" => Ok(ReadType::Rfid),
            "mixed" => Ok(ReadType::Mixed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub broker_url: String,
    pub device_id: String,
    pub delay_ms: u64,
    pub read_type: ReadType,
}

pub fn is_delay(value: String) -> Result<(), String> {
    value.parse::<u64>().map(|_| ()).map_err(|_| "delay must be a non-negative integer".to_string())
}

/// A fixed family-B `TemHum` layout known to decode cleanly (module 2,
/// sensor 10) — only the temperature/humidity BCD bytes vary per tick.
fn temp_hum_frame(device_id: &str, tick: u8) -> (String, Vec<u8>) {
    let temp_tens = (tick % 4) + 2;
    let hum_tens = (tick % 5) + 5;
    let payload = vec![
        0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, temp_tens, 0x29, hum_tens, 0x35, 0x35, 0x01, 0x9E, 0x28,
    ];
    (format!("FamilyB/{device_id}/TemHum"), payload)
}

/// Toggles a single RFID tag attach/detach every other tick, the same
/// `u_state_changed_notify_req` shape `ingest-test-utils::frames` uses.
fn rfid_notify_frame(device_id: &str, tick: u8) -> (String, Vec<u8>) {
    let attached = tick % 2 == 0;
    let action = i32::from(attached);
    let body = format!(
        r#"{{"msg_type":"u_state_changed_notify_req","msg_id":9001,
            "data":[{{"port":2,"mod_id":"8C090995","u_count":24,
                      "events":[{{"num":17,"tag_code":"dd23b0b4","alarm":0,"action":{action}}}]}}]}}"#
    );
    (format!("FamilyT/{device_id}/u_state"), body.into_bytes())
}

fn next_frame(read_type: ReadType, device_id: &str, tick: u8) -> (String, Vec<u8>) {
    match read_type {
        ReadType::TempHum => temp_hum_frame(device_id, tick),
        ReadType::Rfid => rfid_notify_frame(device_id, tick),
        ReadType::Mixed if tick % 2 == 0 => temp_hum_frame(device_id, tick),
        ReadType::Mixed => rfid_notify_frame(device_id, tick),
    }
}

fn parse_broker_url(url: &str) -> (String, u16) {
    let without_scheme = url.split("://").next_back().unwrap_or(url);
    let mut parts = without_scheme.splitn(2, ':');
    let host = parts.next().unwrap_or("localhost").to_string();
    let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1883);
    (host, port)
}

/// Connects to the broker and publishes frames forever at `config.delay_ms`
/// intervals. Runs until the process is killed — there is no shutdown
/// signal here, matching the teacher's emulator (test tooling, not a
/// production service).
pub async fn run(config: EmulatorConfig) {
    let (host, port) = parse_broker_url(&config.broker_url);
    let mut mqtt_options = MqttOptions::new(format!("emulator-{}", config.device_id), host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let (client, mut event_loop) = AsyncClient::new(mqtt_options, 64);

    tokio::spawn(async move {
        loop {
            if event_loop.poll().await.is_err() {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    });

    let mut tick: u8 = 0;
    loop {
        let (topic, payload) = next_frame(config.read_type, &config.device_id, tick);
        match publish(&client, &topic, payload).await {
            Ok(()) => info!(topic, "published synthetic frame"),
            Err(e) => tracing::warn!(topic, error = %e, "publish failed"),
        }
        tick = tick.wrapping_add(1);
        tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
    }
}

async fn publish(client: &AsyncClient, topic: &str, payload: Vec<u8>) -> Result<(), rumqttc::ClientError> {
    client.publish(topic, QoS::AtLeastOnce, false, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_hum_frame_decodes_as_valid_family_b() {
        use bytes::Bytes;
        use canon_protocol::RawFrame;
        use gateway_core::decode::DecoderRegistry;

        let (topic, payload) = temp_hum_frame("GW1", 0);
        let frame = RawFrame::new(topic, Bytes::from(payload));
        let registry = DecoderRegistry::with_builtins();
        let out = registry.decode(&frame).expect("emulator frame should decode");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn rfid_frame_toggles_action_byte() {
        let (_, attached) = rfid_notify_frame("GW1", 0);
        let (_, detached) = rfid_notify_frame("GW1", 1);
        assert!(String::from_utf8(attached).unwrap().contains("\"action\":1"));
        assert!(String::from_utf8(detached).unwrap().contains("\"action\":0"));
    }

    #[test]
    fn broker_url_parses_host_and_port() {
        assert_eq!(parse_broker_url("tcp://localhost:1883"), ("localhost".to_string(), 1883));
        assert_eq!(parse_broker_url("tcp://localhost"), ("localhost".to_string(), 1883));
    }

    #[test]
    fn read_type_parses_from_str() {
        assert_eq!(ReadType::try_from("temp_hum"), Ok(ReadType::TempHum));
        assert_eq!(ReadType::try_from("bogus"), Err(()));
    }
}
