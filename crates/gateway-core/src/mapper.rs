//! Field Mapper (C5): a pure function renaming family-specific raw field
//! names to canonical ones and assembling the typed `Payload` for the
//! Canonical Record Builder (C7). Mapping is declarative — a static
//! per-key rename table — but payload *assembly* (turning a family-B
//! `entries` list or a family-T flat module record into the right
//! `Payload` variant) necessarily differs per `MessageKind`, since that's
//! where the two families' on-wire shapes diverge.

use canon_protocol::{
    ColorPayload, ColorReading, DecodeError, DecoderOutput, DeviceInfoPayload, DeviceKind,
    DoorPayload, HeartbeatModule, HeartbeatPayload, MessageKind, ModuleInfoEntry,
    ModuleInfoPayload, NoiseReading, Payload, RfidPayload, RfidTag, TempHumReading,
};
use serde_json::Value;

/// A hint carried alongside an RFID `Payload` for family-T *event* frames
/// (`u_state_changed_notify_req`), which transmit only the delta, not the
/// full tag snapshot. The State Engine applies these directly instead of
/// diffing against the previous full state (spec §4.3: "action ... must be
/// preserved through to State").
#[derive(Debug, Clone, PartialEq)]
pub struct RfidEventHint {
    pub position: u32,
    pub rfid: String,
    pub alarm: u8,
    pub attached: bool,
}

/// Mapper output: the decoder output's identity fields plus the typed,
/// canonically-named payload.
#[derive(Debug, Clone)]
pub struct MappedRecord {
    pub device_id: String,
    pub device_kind: DeviceKind,
    pub message_kind: MessageKind,
    pub module_number: Option<u32>,
    pub module_id: Option<String>,
    pub msg_id: Option<u32>,
    pub payload: Payload,
    pub rfid_event_hints: Option<Vec<RfidEventHint>>,
}

/// Static rename table: family-specific key → canonical key. Applied by
/// `canonical_key` wherever a raw field name is consulted below.
const RENAME_TABLE: &[(&str, &str)] = &[
    ("num", "position"),
    ("tag_code", "rfid"),
    ("temper_swot", "temperature"),
    ("humidity_swot", "humidity"),
    ("noise_lvl", "level"),
    ("door_status", "status"),
    ("mod_add", "module_address"),
    ("mod_id", "module_id"),
    ("fw_ver", "firmware_version"),
    ("color_val", "code"),
    ("color_name", "color"),
    ("dev_type", "device_type"),
];

fn canonical_key(raw: &str) -> &str {
    RENAME_TABLE
        .iter()
        .find(|(k, _)| *k == raw)
        .map_or(raw, |(_, v)| v)
}

/// Look up a field on an object by its raw OR canonical name.
fn field<'a>(obj: &'a serde_json::Map<String, Value>, canonical: &str) -> Option<&'a Value> {
    obj.get(canonical).or_else(|| {
        RENAME_TABLE
            .iter()
            .find(|(_, v)| *v == canonical)
            .and_then(|(raw, _)| obj.get(*raw))
    })
}

fn as_u32(v: &Value) -> Option<u32> {
    v.as_u64()
        .map(|n| n as u32)
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_u8(v: &Value) -> Option<u8> {
    v.as_u64()
        .map(|n| n as u8)
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_str(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

pub struct FieldMapper;

impl FieldMapper {
    pub fn map(output: DecoderOutput) -> Result<MappedRecord, DecodeError> {
        let (payload, rfid_event_hints) = build_payload(&output)?;
        Ok(MappedRecord {
            device_id: output.device_id,
            device_kind: output.device_kind,
            message_kind: output.message_kind,
            module_number: output.module_number,
            module_id: output.module_id,
            msg_id: output.msg_id,
            payload,
            rfid_event_hints,
        })
    }
}

fn malformed(what: &str) -> DecodeError {
    DecodeError::Malformed(format!("field mapper: {what}"))
}

fn build_payload(out: &DecoderOutput) -> Result<(Payload, Option<Vec<RfidEventHint>>), DecodeError> {
    let fields = &out.raw_fields;
    match out.message_kind {
        MessageKind::Rfid => build_rfid(fields),
        MessageKind::TempHum => Ok((Payload::TempHum(build_temp_hum(fields, out.module_number)?), None)),
        MessageKind::Noise => Ok((Payload::Noise(build_noise(fields, out.module_number)?), None)),
        MessageKind::Door => Ok((Payload::Door(build_door(fields)?), None)),
        MessageKind::Heartbeat => Ok((Payload::Heartbeat(build_heartbeat(out)?), None)),
        MessageKind::DeviceInfo => Ok((Payload::DeviceInfo(build_device_info(fields)?), None)),
        MessageKind::ModuleInfo => Ok((Payload::ModuleInfo(build_module_info(fields)?), None)),
        k if k.is_color_family() => Ok((Payload::Color(build_color(fields, k)?), None)),
        other => Err(malformed(&format!("no payload assembly rule for {other:?}"))),
    }
}

fn build_rfid(fields: &serde_json::Map<String, Value>) -> Result<(Payload, Option<Vec<RfidEventHint>>), DecodeError> {
    if let Some(entries) = field(fields, "entries").and_then(Value::as_array) {
        // Family B: full snapshot of currently-attached tags.
        let mut tags = Vec::with_capacity(entries.len());
        for e in entries {
            let obj = e.as_object().ok_or_else(|| malformed("rfid entry not an object"))?;
            let position = field(obj, "position").and_then(as_u32).ok_or_else(|| malformed("rfid position"))?;
            let rfid = field(obj, "rfid").and_then(as_str).ok_or_else(|| malformed("rfid tag"))?;
            let alarm = field(obj, "alarm").and_then(as_u8).unwrap_or(0);
            tags.push(RfidTag::new(position, rfid, alarm));
        }
        let u_count = field(fields, "u_count").and_then(as_u32).unwrap_or(tags.len() as u32);
        let rfid_count = tags.len() as u32;
        return Ok((
            Payload::Rfid(RfidPayload {
                u_count,
                rfid_count,
                rfid_data: tags,
            }),
            None,
        ));
    }

    if let Some(events) = field(fields, "events").and_then(Value::as_array) {
        // Family T: an event delta, not a full snapshot (spec §4.3).
        let mut tags = Vec::with_capacity(events.len());
        let mut hints = Vec::with_capacity(events.len());
        for e in events {
            let obj = e.as_object().ok_or_else(|| malformed("rfid event not an object"))?;
            let position = field(obj, "position").and_then(as_u32).ok_or_else(|| malformed("rfid event position"))?;
            let rfid = field(obj, "rfid").and_then(as_str).ok_or_else(|| malformed("rfid event tag"))?;
            let alarm = field(obj, "alarm").and_then(as_u8).unwrap_or(0);
            let attached = obj.get("action").and_then(Value::as_u64) == Some(1);
            if attached {
                tags.push(RfidTag::new(position, rfid.clone(), alarm));
            }
            hints.push(RfidEventHint {
                position,
                rfid,
                alarm,
                attached,
            });
        }
        let u_count = field(fields, "u_count").and_then(as_u32).unwrap_or(tags.len() as u32);
        let rfid_count = tags.len() as u32;
        return Ok((
            Payload::Rfid(RfidPayload {
                u_count,
                rfid_count,
                rfid_data: tags,
            }),
            Some(hints),
        ));
    }

    Err(malformed("rfid record has neither entries nor events"))
}

fn build_temp_hum(
    fields: &serde_json::Map<String, Value>,
    module_number: Option<u32>,
) -> Result<Vec<TempHumReading>, DecodeError> {
    if let Some(entries) = field(fields, "entries").and_then(Value::as_array) {
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let obj = e.as_object().ok_or_else(|| malformed("temp/hum entry not an object"))?;
            let position = field(obj, "position").and_then(as_u32).ok_or_else(|| malformed("temp/hum position"))?;
            let temperature = field(obj, "temperature").and_then(as_f64).ok_or_else(|| malformed("temperature"))?;
            let humidity = field(obj, "humidity").and_then(as_f64).ok_or_else(|| malformed("humidity"))?;
            out.push(TempHumReading {
                position,
                temperature,
                humidity,
            });
        }
        return Ok(out);
    }

    // Family T: a single flat reading for this module.
    let temperature = field(fields, "temperature").and_then(as_f64).ok_or_else(|| malformed("temperature"))?;
    let humidity = field(fields, "humidity").and_then(as_f64).ok_or_else(|| malformed("humidity"))?;
    let position = module_number.ok_or_else(|| malformed("temp/hum reading missing module number"))?;
    Ok(vec![TempHumReading {
        position,
        temperature,
        humidity,
    }])
}

fn build_noise(
    fields: &serde_json::Map<String, Value>,
    module_number: Option<u32>,
) -> Result<Vec<NoiseReading>, DecodeError> {
    if let Some(entries) = field(fields, "entries").and_then(Value::as_array) {
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let obj = e.as_object().ok_or_else(|| malformed("noise entry not an object"))?;
            let position = field(obj, "position").and_then(as_u32).ok_or_else(|| malformed("noise position"))?;
            let level = field(obj, "level").and_then(as_f64).ok_or_else(|| malformed("noise level"))?;
            out.push(NoiseReading { position, level });
        }
        return Ok(out);
    }

    let level = field(fields, "level").and_then(as_f64).ok_or_else(|| malformed("noise level"))?;
    let position = module_number.ok_or_else(|| malformed("noise reading missing module number"))?;
    Ok(vec![NoiseReading { position, level }])
}

fn build_door(fields: &serde_json::Map<String, Value>) -> Result<DoorPayload, DecodeError> {
    let raw = field(fields, "status").and_then(as_str).ok_or_else(|| malformed("door status"))?;
    let status = match raw.as_str() {
        "0x00" => "closed".to_string(),
        "0x01" => "open".to_string(),
        "open" | "closed" => raw,
        other => other.to_string(),
    };
    Ok(DoorPayload { status })
}

fn build_heartbeat(out: &DecoderOutput) -> Result<HeartbeatPayload, DecodeError> {
    let fields = &out.raw_fields;
    if let Some(entries) = field(fields, "entries").and_then(Value::as_array) {
        let mut modules = Vec::with_capacity(entries.len());
        for e in entries {
            let obj = e.as_object().ok_or_else(|| malformed("heartbeat entry not an object"))?;
            let module_address = field(obj, "module_address").and_then(as_u8).ok_or_else(|| malformed("heartbeat module_address"))?;
            let module_id = field(obj, "module_id").and_then(as_str).ok_or_else(|| malformed("heartbeat module_id"))?;
            let u_count = field(obj, "u_count").and_then(as_u8).unwrap_or(0);
            modules.push(HeartbeatModule {
                module_address,
                module_id,
                u_count,
            });
        }
        return Ok(HeartbeatPayload { modules });
    }

    // Family T: single module per record.
    let module_address = out.module_number.ok_or_else(|| malformed("heartbeat missing module number"))? as u8;
    let module_id = out.module_id.clone().unwrap_or_default();
    let u_count = field(fields, "u_count").and_then(as_u8).unwrap_or(0);
    Ok(HeartbeatPayload {
        modules: vec![HeartbeatModule {
            module_address,
            module_id,
            u_count,
        }],
    })
}

fn build_device_info(fields: &serde_json::Map<String, Value>) -> Result<DeviceInfoPayload, DecodeError> {
    Ok(DeviceInfoPayload {
        device_type: field(fields, "device_type").and_then(as_u32).unwrap_or(0) as u16,
        firmware_version: field(fields, "firmware_version").and_then(as_u32).unwrap_or(0),
        ip: field(fields, "ip").and_then(as_str).unwrap_or_default(),
        mask: field(fields, "mask").and_then(as_str).unwrap_or_default(),
        gateway: field(fields, "gateway").and_then(as_str).unwrap_or_default(),
        mac: field(fields, "mac").and_then(as_str).unwrap_or_default(),
    })
}

fn build_module_info(fields: &serde_json::Map<String, Value>) -> Result<ModuleInfoPayload, DecodeError> {
    let entries = field(fields, "entries").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut modules = Vec::with_capacity(entries.len());
    for e in &entries {
        let obj = e.as_object().ok_or_else(|| malformed("module info entry not an object"))?;
        let module_address = field(obj, "module_address").and_then(as_u8).ok_or_else(|| malformed("module_address"))?;
        let firmware_version = field(obj, "firmware_version").and_then(as_u64).unwrap_or(0);
        modules.push(ModuleInfoEntry {
            module_address,
            firmware_version,
        });
    }
    Ok(ModuleInfoPayload { modules })
}

fn build_color(fields: &serde_json::Map<String, Value>, kind: MessageKind) -> Result<ColorPayload, DecodeError> {
    let raw_entries = field(fields, "entries")
        .or_else(|| fields.get("colors"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut readings = Vec::with_capacity(raw_entries.len());
    for (i, e) in raw_entries.iter().enumerate() {
        let obj = e.as_object().ok_or_else(|| malformed("color entry not an object"))?;
        let position = field(obj, "position").and_then(as_u32).unwrap_or(i as u32 + 1);
        let code = field(obj, "code").and_then(as_u8).ok_or_else(|| malformed("color code"))?;
        let color = field(obj, "color").and_then(as_str).unwrap_or_else(|| format!("0x{code:02x}"));
        readings.push(ColorReading { position, color, code });
    }

    let ack_success = if kind == MessageKind::Color {
        None
    } else {
        Some(field(fields, "ack_success").and_then(Value::as_bool).unwrap_or(false))
    };

    Ok(ColorPayload { readings, ack_success })
}
