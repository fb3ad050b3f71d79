//! Metrics/Stats (C14): per-kind drop counters and sink failure rates,
//! exposed as a plain snapshot struct (the "stats endpoint" of spec §7,
//! minus HTTP framing — see `QueryApi::get_stats`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use canon_protocol::DecodeError;

#[derive(Debug, Default)]
pub struct Stats {
    frames_received: AtomicU64,
    records_emitted: AtomicU64,
    decode_drops: RwLock<HashMap<&'static str, u64>>,
    state_errors: AtomicU64,
    relay_published: AtomicU64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub records_emitted: u64,
    pub decode_drops: HashMap<&'static str, u64>,
    pub state_errors: u64,
    pub relay_published: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self, err: &DecodeError) {
        let variant = decode_error_variant(err);
        let mut drops = self.decode_drops.write().unwrap();
        *drops.entry(variant).or_insert(0) += 1;
    }

    pub fn record_state_error(&self) {
        self.state_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_published(&self) {
        self.relay_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            decode_drops: self.decode_drops.read().unwrap().clone(),
            state_errors: self.state_errors.load(Ordering::Relaxed),
            relay_published: self.relay_published.load(Ordering::Relaxed),
        }
    }
}

fn decode_error_variant(err: &DecodeError) -> &'static str {
    match err {
        DecodeError::InvalidTopic(_) => "invalid_topic",
        DecodeError::FrameTruncated { .. } => "frame_truncated",
        DecodeError::UnknownMessageKind { .. } => "unknown_message_kind",
        DecodeError::Malformed(_) => "malformed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_decode_errors_by_variant() {
        let stats = Stats::new();
        stats.record_decode_error(&DecodeError::InvalidTopic("x".to_string()));
        stats.record_decode_error(&DecodeError::InvalidTopic("y".to_string()));
        stats.record_decode_error(&DecodeError::FrameTruncated { offset: 0, needed: 1, len: 0 });
        let snap = stats.snapshot();
        assert_eq!(snap.decode_drops.get("invalid_topic"), Some(&2));
        assert_eq!(snap.decode_drops.get("frame_truncated"), Some(&1));
    }
}
