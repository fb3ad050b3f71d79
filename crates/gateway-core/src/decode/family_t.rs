//! Family-T decoder (C3): the structured text protocol.
//!
//! Frames are self-describing JSON objects: a `msg_type` discriminator and a
//! `data` array with one entry per module port. Device id comes from the
//! topic (segment 1), never from the payload, per spec §4.3.
//!
//! Wire shape (resolved ambiguity — spec.md describes the protocol as
//! "structured text" without pinning an exact grammar; this workspace uses
//! JSON, matching the rest of the stack's `serde_json` use and the
//! teacher's own preference for JSON-over-text wire framing):
//!
//! ```json
//! {"msg_type": "u_state_changed_notify_req", "msg_id": 9001,
//!  "data": [{"port": 2, "mod_id": "8C090995", "u_count": 24,
//!            "events": [{"num": 17, "tag_code": "DD23B0B4", "alarm": 0, "action": 1}]}]}
//! ```

use canon_protocol::{DecodeError, DecoderOutput, DeviceKind, MessageKind, RawFrame};
use serde_json::Value;

pub struct FamilyTDecoder;

impl FamilyTDecoder {
    pub fn decode(frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
        let device_id = frame
            .device_id_segment()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DecodeError::InvalidTopic(frame.topic.clone()))?
            .to_string();

        let text = std::str::from_utf8(frame.payload.as_ref())
            .map_err(|e| DecodeError::Malformed(format!("invalid utf-8: {e}")))?;
        let root: Value = serde_json::from_str(text)
            .map_err(|e| DecodeError::Malformed(format!("invalid json: {e}")))?;

        let msg_type = root
            .get("msg_type")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::Malformed("missing msg_type".to_string()))?;
        let msg_id = root.get("msg_id").and_then(Value::as_u64).map(|v| v as u32);
        let data = root.get("data").and_then(Value::as_array);

        let kind = classify(msg_type).ok_or_else(|| DecodeError::UnknownMessageKind {
            topic: frame.topic.clone(),
        })?;

        match kind {
            Kind::Single(message_kind) => decode_per_module(&device_id, message_kind, data, msg_id),
            Kind::DeviceAndModuleInfo => decode_device_and_module_info(&root, &device_id, msg_id),
        }
    }
}

enum Kind {
    Single(MessageKind),
    DeviceAndModuleInfo,
}

/// `msg_type` → messageKind table, per spec §4.3. Prefixes cover the
/// `temper_humidity_*`, `noise_*` and `door_state_*` families of discriminators.
fn classify(msg_type: &str) -> Option<Kind> {
    match msg_type {
        "heart_beat_req" => Some(Kind::Single(MessageKind::Heartbeat)),
        "u_state_changed_notify_req" | "u_state_resp" => Some(Kind::Single(MessageKind::Rfid)),
        "devies_init_req" => Some(Kind::DeviceAndModuleInfo),
        "u_color" => Some(Kind::Single(MessageKind::Color)),
        "set_module_property_result_req" => Some(Kind::Single(MessageKind::ColorSetAck)),
        "clear_u_warning" => Some(Kind::Single(MessageKind::TamperClearAck)),
        s if s.starts_with("temper_humidity_") => Some(Kind::Single(MessageKind::TempHum)),
        s if s.starts_with("noise_") => Some(Kind::Single(MessageKind::Noise)),
        s if s.starts_with("door_state_") => Some(Kind::Single(MessageKind::Door)),
        _ => None,
    }
}

/// One intermediate record per `data[]` entry (one per module port).
fn decode_per_module(
    device_id: &str,
    message_kind: MessageKind,
    data: Option<&Vec<Value>>,
    msg_id: Option<u32>,
) -> Result<Vec<DecoderOutput>, DecodeError> {
    let data = data.ok_or_else(|| DecodeError::Malformed("missing data array".to_string()))?;
    let mut out = Vec::with_capacity(data.len());
    for entry in data {
        let mut rec = DecoderOutput::new(device_id, DeviceKind::T, message_kind);
        if let Some(id) = msg_id {
            rec = rec.with_msg_id(id);
        }
        if let Some(port) = entry.get("port").and_then(Value::as_u64) {
            let mod_id = entry
                .get("mod_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            rec = rec.with_module(port as u32, mod_id);
        }
        if let Value::Object(map) = entry {
            for (k, v) in map {
                if k == "port" || k == "mod_id" {
                    continue;
                }
                rec.set_field(k.clone(), v.clone());
            }
        }
        out.push(rec);
    }
    Ok(out)
}

/// `devies_init_req`: a device-level info block plus a `modules[]` array.
/// Produces one `DeviceInfo` record (no module number) and one `ModuleInfo`
/// record (module inventory), matching the family-B `EF 01` / `EF 02` split.
fn decode_device_and_module_info(
    root: &Value,
    device_id: &str,
    msg_id: Option<u32>,
) -> Result<Vec<DecoderOutput>, DecodeError> {
    let device = root
        .get("device")
        .and_then(Value::as_object)
        .ok_or_else(|| DecodeError::Malformed("missing device object".to_string()))?;

    let mut device_rec = DecoderOutput::new(device_id, DeviceKind::T, MessageKind::DeviceInfo);
    if let Some(id) = msg_id {
        device_rec = device_rec.with_msg_id(id);
    }
    for (k, v) in device {
        device_rec.set_field(k.clone(), v.clone());
    }

    let modules = root
        .get("modules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut module_rec = DecoderOutput::new(device_id, DeviceKind::T, MessageKind::ModuleInfo);
    if let Some(id) = msg_id {
        module_rec = module_rec.with_msg_id(id);
    }
    module_rec.set_field("entries", modules);

    Ok(vec![device_rec, module_rec])
}
