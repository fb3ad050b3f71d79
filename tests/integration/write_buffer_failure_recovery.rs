//! Write Buffer failure recovery (scenario 5): a batch that fails its first
//! save attempt must retry and eventually land in the sink once the
//! transient error clears, all through the public `Pipeline` API rather than
//! the Write Buffer's own inline unit tests.
//!
//! Built directly on `Pipeline::new` with `ingest_test_utils::FakeSink`
//! rather than `ingest::build_pipeline`, since the DB-backed sink in
//! `services/ingest` needs a live Postgres connection `build_pipeline` would
//! dial out for.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use canon_protocol::RawFrame;
use gateway_core::{MessageRelay, Pipeline, PipelineConfig, QueryApi, WriteBufferConfig};
use ingest_test_utils::FakeSink;

fn temp_hum_frame(topic: &str) -> RawFrame {
    RawFrame::new(
        topic,
        Bytes::copy_from_slice(&[0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, 0x1B, 0x29, 0x38, 0x35, 0x35, 0x01, 0x9E, 0x28]),
    )
}

#[tokio::test]
async fn batch_retries_once_then_succeeds() {
    let sink = Arc::new(FakeSink::failing_batches(1));
    let pipeline = Pipeline::new(
        Some(sink.clone()),
        MessageRelay::new(),
        PipelineConfig {
            write_buffer: WriteBufferConfig {
                max_size: 2,
                flush_interval: Duration::from_secs(5),
                max_retries: 3,
            },
            ..PipelineConfig::default()
        },
    );

    pipeline.process_frame(temp_hum_frame("FamilyB/GW1/TemHum")).await;
    pipeline.process_frame(temp_hum_frame("FamilyB/GW1/TemHum")).await;

    assert_eq!(sink.total_saved().await, 2, "batch should land after the retry clears");
    let stats = pipeline.write_buffer_stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.fallback_rows, 0, "a retry that eventually succeeds must not fall back to per-row saves");
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn batch_exhausting_retries_falls_back_to_per_row_saves() {
    let sink = Arc::new(FakeSink::failing_batches(10));
    let pipeline = Pipeline::new(
        Some(sink.clone()),
        MessageRelay::new(),
        PipelineConfig {
            write_buffer: WriteBufferConfig {
                max_size: 2,
                flush_interval: Duration::from_secs(5),
                max_retries: 1,
            },
            ..PipelineConfig::default()
        },
    );

    pipeline.process_frame(temp_hum_frame("FamilyB/GW1/TemHum")).await;
    pipeline.process_frame(temp_hum_frame("FamilyB/GW1/TemHum")).await;

    assert!(sink.saved_batches().await.is_empty(), "the batch path never succeeded");
    assert_eq!(sink.saved_rows().await.len(), 2, "rows should have been saved one at a time");
    let stats = pipeline.write_buffer_stats();
    assert_eq!(stats.fallback_rows, 2);
    assert_eq!(stats.dropped_rows, 0);
}
