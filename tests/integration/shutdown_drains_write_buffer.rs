//! Shutdown must flush pending buffered records before the pipeline reports
//! itself stopped — otherwise a process restart between a buffered write and
//! the next size/time flush trigger would silently drop data.

use std::sync::Arc;

use bytes::Bytes;
use canon_protocol::RawFrame;
use gateway_core::{Component, ComponentState, MessageRelay, Pipeline, PipelineConfig, QueryApi};
use ingest_test_utils::FakeSink;

fn temp_hum_frame(device_id: &str) -> RawFrame {
    RawFrame::new(
        format!("FamilyB/{device_id}/TemHum"),
        Bytes::copy_from_slice(&[0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, 0x1B, 0x29, 0x38, 0x35, 0x35, 0x01, 0x9E, 0x28]),
    )
}

#[tokio::test]
async fn shutdown_flushes_whatever_is_still_pending() {
    let sink = Arc::new(FakeSink::new());
    let pipeline = Pipeline::new(Some(sink.clone()), MessageRelay::new(), PipelineConfig::default());

    pipeline.process_frame(temp_hum_frame("GW1")).await;
    pipeline.process_frame(temp_hum_frame("GW2")).await;

    assert_eq!(sink.total_saved().await, 0, "default max_size keeps these buffered, not yet flushed");
    assert_eq!(pipeline.write_buffer_stats().pending, 2);

    pipeline.shutdown().await;

    assert_eq!(sink.total_saved().await, 2, "shutdown must drain the buffer into the sink");
    assert_eq!(Component::status(&*pipeline).state, ComponentState::Stopped);
}

#[tokio::test]
async fn shutdown_with_nothing_buffered_is_a_no_op_flush() {
    let sink = Arc::new(FakeSink::new());
    let pipeline = Pipeline::new(Some(sink.clone()), MessageRelay::new(), PipelineConfig::default());

    pipeline.shutdown().await;

    assert_eq!(sink.total_saved().await, 0);
    assert_eq!(Component::status(&*pipeline).state, ComponentState::Stopped);
}
