//! End-to-end ingest: builds a real pipeline from a TOML config via
//! `ingest::build_pipeline`, then drives it through an in-process mock
//! broker standing in for the MQTT transport, exercising scenarios 1-3
//! (RFID attach, TempHum decode, Family-T multi-module) through the whole
//! decode → map → state → build → fan-out → query path.

use gateway_core::QueryApi;
use ingest_test_utils::{frames, MockBroker};

const CONFIG: &str = r#"
    [mqtt]
    url = "tcp://localhost:1883"
    topics = ["FamilyB/#", "FamilyT/#"]
"#;

async fn simulate_adapter(broker: &MockBroker, pipeline: &std::sync::Arc<gateway_core::Pipeline>) {
    let mut sub = broker.subscribe("#");
    while let Some(msg) = sub.try_recv() {
        let frame = canon_protocol::RawFrame::new(msg.topic, bytes::Bytes::from(msg.payload));
        pipeline.process_frame(frame).await;
    }
}

#[tokio::test]
async fn rfid_attach_then_detach_scenario_1() {
    let config = ingest::config::load_config_from_str(CONFIG).unwrap();
    let pipeline = ingest::build_pipeline(&config).await.unwrap();
    let broker = MockBroker::start();

    let attach = frames::family_t_rfid_notify("GW1", 2, "dd23b0b4", true);
    broker.publish(attach.topic, attach.payload.to_vec());
    simulate_adapter(&broker, &pipeline).await;

    let latest = pipeline.get_latest_by_device("GW1").await.expect("record should be cached");
    let canon_protocol::Payload::Rfid(rfid) = &latest.payload else {
        panic!("expected rfid payload");
    };
    assert_eq!(rfid.rfid_data.len(), 1);
    assert_eq!(rfid.rfid_data[0].rfid, "dd23b0b4");

    let detach = frames::family_t_rfid_notify("GW1", 2, "dd23b0b4", false);
    broker.publish(detach.topic, detach.payload.to_vec());
    simulate_adapter(&broker, &pipeline).await;

    let latest = pipeline.get_latest_by_device("GW1").await.unwrap();
    let canon_protocol::Payload::Rfid(rfid) = &latest.payload else {
        panic!("expected rfid payload");
    };
    assert!(rfid.rfid_data.is_empty(), "detached tag must not remain attached");
    assert!(latest.changes.is_some(), "detach must produce a change event");
}

#[tokio::test]
async fn temp_hum_decode_scenario_2() {
    let config = ingest::config::load_config_from_str(CONFIG).unwrap();
    let pipeline = ingest::build_pipeline(&config).await.unwrap();
    let broker = MockBroker::start();

    let frame = frames::family_b_temp_hum("GW2");
    broker.publish(frame.topic, frame.payload.to_vec());
    simulate_adapter(&broker, &pipeline).await;

    let latest = pipeline.get_latest_by_device("GW2").await.expect("record should be cached");
    assert_eq!(latest.message_kind, canon_protocol::MessageKind::TempHum);
    assert_eq!(latest.device_kind, canon_protocol::DeviceKind::B);
    let stats = pipeline.get_stats();
    assert_eq!(stats.records_emitted, 1);
    assert_eq!(stats.frames_received, 1);
}

#[tokio::test]
async fn unknown_frame_surfaces_as_a_decode_drop_not_a_record() {
    let config = ingest::config::load_config_from_str(CONFIG).unwrap();
    let pipeline = ingest::build_pipeline(&config).await.unwrap();
    let broker = MockBroker::start();

    broker.publish("FamilyZ/GW3/x", b"garbage".to_vec());
    simulate_adapter(&broker, &pipeline).await;

    assert!(pipeline.get_latest_by_device("GW3").await.is_none());
    assert_eq!(pipeline.get_stats().decode_drops.get("invalid_topic"), Some(&1));
}
