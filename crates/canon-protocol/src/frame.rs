use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A single MQTT message as received by the adapter (C12), before decode.
/// Topic is the sole authority for device identity and message category —
/// decoders never infer identity from payload content.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Topic segments split on `/`, e.g. `"FamilyB/2437871205/TemHum"` → `["FamilyB", "2437871205", "TemHum"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.topic.split('/').collect()
    }

    /// Segment 1 (0-indexed) — the device id, per spec §6 topic layout
    /// `"<family>/<deviceId>/<category>"`.
    pub fn device_id_segment(&self) -> Option<&str> {
        self.segments().get(1).copied()
    }

    /// Segment 2 — the category token used for family-B classification.
    pub fn category_segment(&self) -> Option<&str> {
        self.segments().get(2).copied()
    }

    /// Leading token, used by the Decoder Registry's prefix match.
    pub fn family_segment(&self) -> Option<&str> {
        self.segments().first().copied()
    }
}
