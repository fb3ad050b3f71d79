//! Message relay loop prevention (scenario 6): a frame that lands on a
//! relay-generated topic must never re-enter the pipeline as a second
//! record, otherwise a relay rule targeting a pattern it itself matches
//! would republish forever.
//!
//! Drives `ingest::build_pipeline` with `message_relay` enabled, then
//! simulates the adapter's own relay step (consume `PipelineEvent::RelayMessage`,
//! republish onto the mock broker, feed it back through `process_frame`)
//! exactly the way `mqtt_adapter::relay_loop` does against a real broker.

use std::sync::Arc;

use canon_protocol::RawFrame;
use gateway_core::{Pipeline, PipelineEvent, QueryApi};
use ingest_test_utils::{frames, MockBroker};

const CONFIG: &str = r#"
    [mqtt]
    url = "tcp://localhost:1883"
    topics = ["FamilyB/#", "new/#"]

    [message_relay]
    enabled = true
    topic_prefix = "new/"
    [message_relay.patterns]
    FamilyB = "new/${gatewayId}/TemHum"
"#;

async fn drain_broker_into_pipeline(broker: &MockBroker, pipeline: &Arc<Pipeline>) {
    let mut sub = broker.subscribe("#");
    while let Some(msg) = sub.try_recv() {
        let frame = RawFrame::new(msg.topic, bytes::Bytes::from(msg.payload));
        pipeline.process_frame(frame).await;
    }
}

/// Drains any `RelayMessage` events the last `process_frame` call emitted
/// back onto the broker, standing in for the adapter's republish loop.
fn drain_relay_events(pipeline: &Pipeline, broker: &MockBroker) {
    let mut rx = pipeline.subscribe_events();
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::RelayMessage { topic, payload } = event {
            broker.publish(topic, payload);
        }
    }
}

#[tokio::test]
async fn relayed_topic_does_not_produce_a_second_record_or_republish_again() {
    let config = ingest::config::load_config_from_str(CONFIG).unwrap();
    let pipeline = ingest::build_pipeline(&config).await.unwrap();
    let broker = MockBroker::start();

    let frame = frames::family_b_temp_hum("GW1");
    broker.publish(frame.topic, frame.payload.to_vec());
    drain_broker_into_pipeline(&broker, &pipeline).await;

    assert_eq!(pipeline.get_stats().records_emitted, 1, "the original frame should produce exactly one record");

    drain_relay_events(&pipeline, &broker);
    drain_broker_into_pipeline(&broker, &pipeline).await;

    assert_eq!(
        pipeline.get_stats().records_emitted,
        1,
        "the relayed copy must be recognized as self-generated and dropped before decode"
    );
    assert_eq!(pipeline.get_stats().frames_received, 2, "the relayed frame is still observed, just not turned into a record");

    drain_relay_events(&pipeline, &broker);
    assert!(broker.published().len() <= 2, "no further republish should have been triggered by the dropped relay copy");
}
