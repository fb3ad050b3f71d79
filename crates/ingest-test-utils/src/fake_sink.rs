//! An in-memory `WriteSink` double, used wherever a test needs to observe
//! what the Write Buffer would have persisted without a real database.

use async_trait::async_trait;
use canon_protocol::CanonicalRecord;
use gateway_core::{SinkError, WriteSink};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

pub struct FakeSink {
    batches: Mutex<Vec<Vec<CanonicalRecord>>>,
    rows: Mutex<Vec<CanonicalRecord>>,
    /// Number of remaining `save_batch` calls that should fail before one
    /// succeeds, for exercising the Write Buffer's retry path.
    fail_batches_remaining: AtomicU32,
    /// When true, `save_row` also fails — pushes a record past fallback
    /// into the dropped-row path.
    fail_rows: std::sync::atomic::AtomicBool,
}

impl FakeSink {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            rows: Mutex::new(Vec::new()),
            fail_batches_remaining: AtomicU32::new(0),
            fail_rows: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn failing_batches(times: u32) -> Self {
        let sink = Self::new();
        sink.fail_batches_remaining.store(times, Ordering::SeqCst);
        sink
    }

    pub fn set_fail_rows(&self, fail: bool) {
        self.fail_rows.store(fail, Ordering::SeqCst);
    }

    pub async fn saved_batches(&self) -> Vec<Vec<CanonicalRecord>> {
        self.batches.lock().await.clone()
    }

    pub async fn saved_rows(&self) -> Vec<CanonicalRecord> {
        self.rows.lock().await.clone()
    }

    pub async fn total_saved(&self) -> usize {
        let batched: usize = self.batches.lock().await.iter().map(Vec::len).sum();
        batched + self.rows.lock().await.len()
    }
}

impl Default for FakeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WriteSink for FakeSink {
    async fn save_batch(&self, records: &[CanonicalRecord]) -> Result<(), SinkError> {
        if self.fail_batches_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_batches_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(SinkError::Failed("fake sink: forced batch failure".to_string()));
        }
        self.batches.lock().await.push(records.to_vec());
        Ok(())
    }

    async fn save_row(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
        if self.fail_rows.load(Ordering::SeqCst) {
            return Err(SinkError::Failed("fake sink: forced row failure".to_string()));
        }
        self.rows.lock().await.push(record.clone());
        Ok(())
    }
}
