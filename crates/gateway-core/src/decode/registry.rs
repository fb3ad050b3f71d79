//! Decoder Registry (C4): routes a raw frame to the decoder registered for
//! its family prefix (the topic's leading segment, e.g. `"FamilyB"`).

use std::collections::HashMap;

use canon_protocol::{DecodeError, DecoderOutput, DeviceKind, MessageKind, RawFrame};

use super::family_b::FamilyBDecoder;
use super::family_t::FamilyTDecoder;

type DecodeFn = fn(&RawFrame) -> Result<Vec<DecoderOutput>, DecodeError>;

/// Routes frames by topic prefix to a registered decode function, falling
/// back to a pass-through "basic" decoder when the family is known but the
/// frame itself can't be classified (spec §4.4).
pub struct DecoderRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// The registry pre-wired with the two built-in families, matching the
    /// `FamilyB/#` and `FamilyT/#` subscriptions of spec §6.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("FamilyB", FamilyBDecoder::decode);
        reg.register("FamilyT", FamilyTDecoder::decode);
        reg
    }

    pub fn register(&mut self, prefix: impl Into<String>, decoder: DecodeFn) {
        self.decoders.insert(prefix.into(), decoder);
    }

    /// Decode a frame. Returns `InvalidTopic` (no record produced) when the
    /// device id can't be extracted from the topic at all; otherwise falls
    /// back to a basic pass-through record for an unclassifiable frame on a
    /// known family, per spec §4.4.
    pub fn decode(&self, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
        let device_id = frame
            .device_id_segment()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DecodeError::InvalidTopic(frame.topic.clone()))?;

        let family = frame.family_segment().unwrap_or_default();
        let Some(decoder) = self.decoders.get(family) else {
            return Err(DecodeError::InvalidTopic(frame.topic.clone()));
        };

        match decoder(frame) {
            Ok(records) => Ok(records),
            Err(DecodeError::UnknownMessageKind { .. }) => Ok(vec![basic_passthrough(
                device_id,
                family,
                frame,
            )]),
            Err(other) => Err(other),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn basic_passthrough(device_id: &str, family: &str, frame: &RawFrame) -> DecoderOutput {
    let device_kind = if family == "FamilyT" {
        DeviceKind::T
    } else {
        DeviceKind::B
    };
    let mut out = DecoderOutput::new(device_id, device_kind, MessageKind::Heartbeat);
    out.set_field("passthrough", true);
    out.set_field("raw_len", frame.payload.len() as u64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn routes_to_registered_family() {
        let reg = DecoderRegistry::with_builtins();
        let f = RawFrame::new(
            "FamilyB/GW1/TemHum",
            Bytes::from(vec![
                0x02, 0x8C, 0x09, 0x09, 0x95, 0x0A, 0x1B, 0x29, 0x38, 0x35, 0x35, 0x01, 0x9E, 0x28,
            ]),
        );
        let out = reg.decode(&f).unwrap();
        assert_eq!(out[0].message_kind, MessageKind::TempHum);
    }

    #[test]
    fn unknown_family_is_invalid_topic() {
        let reg = DecoderRegistry::with_builtins();
        let f = RawFrame::new("FamilyZ/GW1/x", Bytes::from_static(b""));
        assert!(matches!(reg.decode(&f), Err(DecodeError::InvalidTopic(_))));
    }

    #[test]
    fn unclassifiable_frame_on_known_family_falls_back_to_basic() {
        let reg = DecoderRegistry::with_builtins();
        let f = RawFrame::new("FamilyB/GW1/Bogus", Bytes::from_static(b"\x00"));
        let out = reg.decode(&f).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw_fields.get("passthrough").unwrap(), true);
    }

    #[test]
    fn missing_device_id_never_produces_a_record() {
        let reg = DecoderRegistry::with_builtins();
        let f = RawFrame::new("FamilyB", Bytes::from_static(b""));
        assert!(matches!(reg.decode(&f), Err(DecodeError::InvalidTopic(_))));
    }
}
