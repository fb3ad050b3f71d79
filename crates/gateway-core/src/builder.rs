//! Canonical Record Builder (C7): composes Field Mapper output, State
//! Engine annotations and frame metadata into the immutable `CanonicalRecord`,
//! including the quality score (spec §4.7).

use canon_protocol::{CanonicalRecord, DeviceKind, Meta, Payload, RawFrame};
use chrono::{DateTime, Utc};

use crate::mapper::MappedRecord;
use crate::state_engine::StateUpdate;

pub struct CanonicalBuilder;

impl CanonicalBuilder {
    pub fn build(frame: &RawFrame, mapped: MappedRecord, state: StateUpdate, timestamp: DateTime<Utc>) -> CanonicalRecord {
        let raw_frame = match mapped.device_kind {
            DeviceKind::B => Some(hex_dump(frame.payload.as_ref())),
            DeviceKind::T => None,
        };

        let quality_score = quality_score(&mapped, &state, timestamp);

        CanonicalRecord {
            device_id: mapped.device_id,
            device_kind: mapped.device_kind,
            message_kind: mapped.message_kind,
            module_number: mapped.module_number,
            module_id: mapped.module_id,
            timestamp,
            payload: state.payload,
            meta: Meta {
                raw_topic: frame.topic.clone(),
                raw_frame,
                msg_id: mapped.msg_id,
                quality_score,
                has_changes: state.has_changes,
            },
            changes: Some(state.changes),
            previous_state: state.previous_state,
        }
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Mean of four 0-100 sub-scores: completeness, consistency, timestamp
/// validity/recency, and payload structural checks (spec §4.7).
fn quality_score(mapped: &MappedRecord, state: &StateUpdate, timestamp: DateTime<Utc>) -> f64 {
    let scores = [
        completeness_score(mapped),
        consistency_score(mapped),
        timestamp_score(timestamp),
        payload_score(&state.payload, state.has_changes, &state.changes),
    ];
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn completeness_score(mapped: &MappedRecord) -> f64 {
    let mut required = 2.0; // device_id, payload are always required
    let mut present = 0.0;
    if !mapped.device_id.trim().is_empty() {
        present += 1.0;
    }
    present += 1.0; // payload is always constructed by this point

    if requires_module(mapped.message_kind) {
        required += 1.0;
        if mapped.module_number.is_some() {
            present += 1.0;
        }
    }
    (present / required) * 100.0
}

fn requires_module(kind: canon_protocol::MessageKind) -> bool {
    use canon_protocol::MessageKind::*;
    !matches!(kind, DeviceInfo)
}

fn consistency_score(mapped: &MappedRecord) -> f64 {
    let module_ok = mapped.module_number.map(|n| n <= 255).unwrap_or(true);
    let device_id_ok = !mapped.device_id.trim().is_empty();
    if module_ok && device_id_ok {
        100.0
    } else {
        0.0
    }
}

fn timestamp_score(timestamp: DateTime<Utc>) -> f64 {
    let now = Utc::now();
    if timestamp > now + chrono::Duration::minutes(5) {
        return 0.0;
    }
    let age = now - timestamp;
    if age <= chrono::Duration::hours(24) {
        100.0
    } else {
        0.0
    }
}

fn payload_score(payload: &Payload, has_changes: bool, changes: &[canon_protocol::ChangeEvent]) -> f64 {
    let ok = match payload {
        Payload::Rfid(p) => {
            if has_changes {
                p.rfid_data.len() == changes.len()
            } else {
                p.rfid_data.len() as u32 == p.rfid_count
            }
        }
        Payload::TempHum(readings) => readings.iter().all(|r| r.temperature.is_finite() && r.humidity.is_finite()),
        Payload::Noise(readings) => readings.iter().all(|r| r.level.is_finite()),
        Payload::Door(d) => !d.status.is_empty(),
        Payload::Color(c) => c.readings.iter().all(|r| !r.color.is_empty()),
        Payload::Heartbeat(h) => !h.modules.is_empty(),
        Payload::DeviceInfo(d) => !d.ip.is_empty() || !d.mac.is_empty(),
        Payload::ModuleInfo(_) => true,
    };
    if ok {
        100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use canon_protocol::{DoorPayload, MessageKind};

    fn mapped(message_kind: MessageKind, module_number: Option<u32>) -> MappedRecord {
        MappedRecord {
            device_id: "GW1".to_string(),
            device_kind: DeviceKind::B,
            message_kind,
            module_number,
            module_id: None,
            msg_id: Some(1),
            payload: Payload::Door(DoorPayload { status: "open".to_string() }),
            rfid_event_hints: None,
        }
    }

    fn state_update(has_changes: bool) -> StateUpdate {
        StateUpdate {
            payload: Payload::Door(DoorPayload { status: "open".to_string() }),
            changes: vec![],
            previous_state: None,
            has_changes,
        }
    }

    #[test]
    fn builds_record_with_hex_frame_for_family_b() {
        let frame = RawFrame::new("FamilyB/GW1/OpeAck", Bytes::from_static(&[0xBA, 0x01]));
        let rec = CanonicalBuilder::build(&frame, mapped(MessageKind::Door, Some(2)), state_update(false), Utc::now());
        assert_eq!(rec.meta.raw_frame.as_deref(), Some("ba01"));
        assert!(rec.meta.quality_score > 0.0);
    }

    #[test]
    fn family_t_does_not_carry_raw_frame() {
        let frame = RawFrame::new("FamilyT/GW1/door", Bytes::from_static(b"{}"));
        let mut m = mapped(MessageKind::Door, Some(2));
        m.device_kind = DeviceKind::T;
        let rec = CanonicalBuilder::build(&frame, m, state_update(false), Utc::now());
        assert!(rec.meta.raw_frame.is_none());
    }

    #[test]
    fn stale_timestamp_lowers_quality_score() {
        let frame = RawFrame::new("FamilyB/GW1/OpeAck", Bytes::from_static(&[0x00]));
        let old = Utc::now() - chrono::Duration::hours(48);
        let rec = CanonicalBuilder::build(&frame, mapped(MessageKind::Door, Some(2)), state_update(false), old);
        // timestamp sub-score drops out of the mean
        assert!(rec.meta.quality_score < 100.0);
    }
}
