use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::payload::{DeviceKind, MessageKind, Payload};

/// Intermediate shape produced by a decoder (C2/C3), before the Field Mapper
/// renames family-specific keys to canonical ones. `raw_fields` is an open
/// map on purpose: the Mapper is specified as a pure rename over whatever
/// keys the decoder happened to emit, not a second typed schema.
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    pub device_id: String,
    pub device_kind: DeviceKind,
    pub message_kind: MessageKind,
    pub module_number: Option<u32>,
    pub module_id: Option<String>,
    pub raw_fields: Map<String, Value>,
    pub msg_id: Option<u32>,
}

impl DecoderOutput {
    pub fn new(device_id: impl Into<String>, device_kind: DeviceKind, message_kind: MessageKind) -> Self {
        Self {
            device_id: device_id.into(),
            device_kind,
            message_kind,
            module_number: None,
            module_id: None,
            raw_fields: Map::new(),
            msg_id: None,
        }
    }

    pub fn with_module(mut self, number: u32, id: impl Into<String>) -> Self {
        self.module_number = Some(number);
        self.module_id = Some(id.into());
        self
    }

    pub fn with_msg_id(mut self, msg_id: u32) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.raw_fields.insert(key.into(), value.into());
    }
}

/// A state transition on a single position within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Attached,
    Detached,
    Changed,
    AlarmChanged,
    Set,
    Updated,
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub position: u32,
    pub action: ChangeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the previous record on this key, set only for `Door`
    /// (spec §4.6: "for Door, also compute duration = now - previousTimestamp").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
}

impl ChangeEvent {
    pub fn new(position: u32, action: ChangeAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            action,
            previous: None,
            current: None,
            timestamp,
            duration_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub raw_topic: String,
    /// Hex dump of the original payload — only populated for family B, whose
    /// frames are fixed binary layouts worth keeping for diagnosis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u32>,
    pub quality_score: f64,
    pub has_changes: bool,
}

/// Immutable once emitted. Produced by the Canonical Record Builder (C7)
/// from a `DecoderOutput` that has passed through the Field Mapper and
/// State Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub device_id: String,
    pub device_kind: DeviceKind,
    pub message_kind: MessageKind,
    pub module_number: Option<u32>,
    pub module_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub meta: Meta,
    pub changes: Option<Vec<ChangeEvent>>,
    pub previous_state: Option<Payload>,
}

impl CanonicalRecord {
    /// Enforces the one hard invariant that must never reach a sink: a
    /// non-empty `device_id` (spec §3 "records lacking one must be rejected").
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.device_id.trim().is_empty() {
            return Err(DecodeError::InvalidTopic(self.meta.raw_topic.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(device_id: &str) -> CanonicalRecord {
        CanonicalRecord {
            device_id: device_id.to_string(),
            device_kind: DeviceKind::B,
            message_kind: MessageKind::Door,
            module_number: Some(2),
            module_id: None,
            timestamp: Utc::now(),
            payload: Payload::Door(crate::payload::DoorPayload {
                status: "open".to_string(),
            }),
            meta: Meta {
                raw_topic: "FamilyB/2437871205/OpeAck".to_string(),
                raw_frame: None,
                msg_id: None,
                quality_score: 100.0,
                has_changes: false,
            },
            changes: None,
            previous_state: None,
        }
    }

    #[test]
    fn rejects_empty_device_id() {
        assert!(sample("").validate().is_err());
        assert!(sample("   ").validate().is_err());
    }

    #[test]
    fn accepts_non_empty_device_id() {
        assert!(sample("2437871205").validate().is_ok());
    }
}
