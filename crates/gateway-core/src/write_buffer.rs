//! Write Buffer (C9): size/time-triggered batch insert with bounded retry
//! and per-row fallback (spec §4.9).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canon_protocol::CanonicalRecord;
use tokio::sync::Mutex;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink error: {0}")]
    Failed(String),
}

/// The storage backend a Write Buffer drains into. Implemented by the
/// DB-backed sink in `services/ingest`; tests use an in-memory fake.
#[async_trait]
pub trait WriteSink: Send + Sync {
    async fn save_batch(&self, records: &[CanonicalRecord]) -> Result<(), SinkError>;
    async fn save_row(&self, record: &CanonicalRecord) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
pub struct WriteBufferStats {
    pub flushes: AtomicU64,
    pub retries: AtomicU64,
    pub fallback_rows: AtomicU64,
    pub dropped_rows: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteBufferStatsSnapshot {
    pub flushes: u64,
    pub retries: u64,
    pub fallback_rows: u64,
    pub dropped_rows: u64,
    pub pending: usize,
}

pub struct WriteBufferConfig {
    pub max_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            flush_interval: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

pub struct WriteBuffer {
    sink: Option<Arc<dyn WriteSink>>,
    buffer: Mutex<Vec<CanonicalRecord>>,
    is_flushing: AtomicBool,
    shutting_down: AtomicBool,
    max_size: usize,
    max_retries: u32,
    stats: WriteBufferStats,
}

impl WriteBuffer {
    /// `sink = None` disables the DB path entirely — `push`/`flush` become
    /// no-ops (records are still delivered to other sinks by the pipeline).
    pub fn new(sink: Option<Arc<dyn WriteSink>>, config: WriteBufferConfig) -> Self {
        Self {
            sink,
            buffer: Mutex::new(Vec::new()),
            is_flushing: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            max_size: config.max_size,
            max_retries: config.max_retries,
            stats: WriteBufferStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Mark the buffer as draining. Flushes in flight are given a chance to
    /// finish a batch but won't sleep out further backoff attempts.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub async fn push(&self, record: CanonicalRecord) {
        if self.sink.is_none() {
            return;
        }
        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(record);
            buffer.len() >= self.max_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// `pending` is best-effort: if a flush currently holds the buffer lock
    /// this reports 0 rather than blocking a synchronous caller.
    pub fn stats(&self) -> WriteBufferStatsSnapshot {
        let pending = self.buffer.try_lock().map(|b| b.len()).unwrap_or(0);
        WriteBufferStatsSnapshot {
            flushes: self.stats.flushes.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            fallback_rows: self.stats.fallback_rows.load(Ordering::Relaxed),
            dropped_rows: self.stats.dropped_rows.load(Ordering::Relaxed),
            pending,
        }
    }

    /// Critical section: at most one flush runs at a time (spec §4.9).
    pub async fn flush(&self) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        if self
            .is_flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let batch = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            self.is_flushing.store(false, Ordering::SeqCst);
            return;
        }

        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        let mut attempt = 0u32;
        loop {
            match sink.save_batch(&batch).await {
                Ok(()) => {
                    self.is_flushing.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) if attempt < self.max_retries => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, error = %e, "write buffer batch save failed, retrying");
                    if self.shutting_down.load(Ordering::SeqCst) {
                        let mut buffer = self.buffer.lock().await;
                        let mut restored = batch;
                        restored.append(&mut buffer);
                        *buffer = restored;
                        self.is_flushing.store(false, Ordering::SeqCst);
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt) + 1)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, rows = batch.len(), "write buffer batch save exhausted retries, falling back to per-row");
                    break;
                }
            }
        }

        for record in &batch {
            match sink.save_row(record).await {
                Ok(()) => {
                    self.stats.fallback_rows.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.dropped_rows.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, device_id = %record.device_id, "row dropped after fallback save failed");
                }
            }
        }
        self.is_flushing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_protocol::{DeviceKind, Meta, MessageKind, Payload};
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            device_id: "GW1".to_string(),
            device_kind: DeviceKind::B,
            message_kind: MessageKind::Door,
            module_number: Some(1),
            module_id: None,
            timestamp: Utc::now(),
            payload: Payload::Door(canon_protocol::DoorPayload { status: "open".to_string() }),
            meta: Meta {
                raw_topic: "FamilyB/GW1/OpeAck".to_string(),
                raw_frame: None,
                msg_id: None,
                quality_score: 100.0,
                has_changes: false,
            },
            changes: None,
            previous_state: None,
        }
    }

    struct FlakySink {
        fail_times: AtomicU32,
        saved: Mutex<Vec<CanonicalRecord>>,
    }

    #[async_trait]
    impl WriteSink for FlakySink {
        async fn save_batch(&self, records: &[CanonicalRecord]) -> Result<(), SinkError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::Failed("transient".to_string()));
            }
            self.saved.lock().await.extend(records.iter().cloned());
            Ok(())
        }

        async fn save_row(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
            self.saved.lock().await.push(record.clone());
            Ok(())
        }
    }

    struct AlwaysFailSink;

    #[async_trait]
    impl WriteSink for AlwaysFailSink {
        async fn save_batch(&self, _records: &[CanonicalRecord]) -> Result<(), SinkError> {
            Err(SinkError::Failed("permanent".to_string()))
        }
        async fn save_row(&self, _record: &CanonicalRecord) -> Result<(), SinkError> {
            Err(SinkError::Failed("permanent".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds_scenario_5() {
        let sink = Arc::new(FlakySink {
            fail_times: AtomicU32::new(3),
            saved: Mutex::new(vec![]),
        });
        let buffer = WriteBuffer::new(Some(sink.clone()), WriteBufferConfig::default());
        for _ in 0..5 {
            buffer.push(record()).await;
        }
        let flush_task = tokio::spawn({
            let buffer = Arc::new(buffer);
            let b2 = buffer.clone();
            async move {
                b2.flush().await;
                buffer
            }
        });
        tokio::time::advance(Duration::from_secs(10)).await;
        let buffer = flush_task.await.unwrap();

        assert_eq!(sink.saved.lock().await.len(), 5);
        assert_eq!(buffer.stats().retries, 3);
        assert_eq!(buffer.pending_len().await, 0);
    }

    #[tokio::test]
    async fn push_at_max_size_triggers_flush_before_returning() {
        let sink = Arc::new(FlakySink {
            fail_times: AtomicU32::new(0),
            saved: Mutex::new(vec![]),
        });
        let buffer = WriteBuffer::new(
            Some(sink.clone()),
            WriteBufferConfig {
                max_size: 3,
                flush_interval: Duration::from_secs(5),
                max_retries: 3,
            },
        );
        for _ in 0..3 {
            buffer.push(record()).await;
        }
        assert_eq!(buffer.pending_len().await, 0);
        assert_eq!(sink.saved.lock().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_falls_back_to_per_row() {
        let sink = Arc::new(AlwaysFailSink);
        let buffer = WriteBuffer::new(Some(sink.clone()), WriteBufferConfig { max_retries: 1, ..WriteBufferConfig::default() });
        buffer.push(record()).await;
        let flush = tokio::spawn({
            let buffer = Arc::new(buffer);
            let b2 = buffer.clone();
            async move {
                b2.flush().await;
                buffer
            }
        });
        tokio::time::advance(Duration::from_secs(10)).await;
        let buffer = flush.await.unwrap();
        assert_eq!(buffer.stats().dropped_rows, 1);
        assert_eq!(buffer.stats().fallback_rows, 0);
    }

    #[tokio::test]
    async fn disabled_sink_makes_push_and_flush_no_ops() {
        let buffer = WriteBuffer::new(None, WriteBufferConfig::default());
        buffer.push(record()).await;
        buffer.flush().await;
        assert!(!buffer.is_enabled());
    }
}
