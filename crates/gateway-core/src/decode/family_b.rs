//! Family-B decoder (C2): the compact binary/hex framed protocol.
//!
//! Classification uses the topic's third segment first, falling back to the
//! first one or two payload bytes when the segment is ambiguous (`OpeAck`
//! covers Heartbeat, Door, DeviceInfo, ModuleInfo and the three color-ack
//! kinds). Byte-exact layouts are per spec §4.2.

use canon_protocol::{DecodeError, DecoderOutput, DeviceKind, MessageKind, RawFrame};
use serde_json::json;

use crate::reader::FrameReader;

pub struct FamilyBDecoder;

impl FamilyBDecoder {
    pub fn decode(frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
        let device_id = frame
            .device_id_segment()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DecodeError::InvalidTopic(frame.topic.clone()))?
            .to_string();
        let tail = frame.category_segment().unwrap_or_default();
        let r = FrameReader::new(frame.payload.as_ref());

        match tail {
            "TemHum" => decode_temp_hum(&r, &device_id, frame),
            "Noise" => decode_noise(&r, &device_id, frame),
            "LabelState" => match r.read_u8(0)? {
                0xBB => decode_rfid(&r, &device_id, frame),
                _ => Err(unknown(frame)),
            },
            "OpeAck" => decode_ope_ack(&r, &device_id, frame),
            _ => Err(unknown(frame)),
        }
    }
}

fn unknown(frame: &RawFrame) -> DecodeError {
    DecodeError::UnknownMessageKind {
        topic: frame.topic.clone(),
    }
}

fn decode_ope_ack(r: &FrameReader, device_id: &str, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    match r.read_u8(0)? {
        0xCB | 0xCC => decode_heartbeat(r, device_id, frame),
        0xBA => decode_door(r, device_id, frame),
        0xEF => match r.read_u8(1)? {
            0x01 => decode_device_info(r, device_id, frame),
            0x02 => decode_module_info(r, device_id, frame),
            _ => Err(unknown(frame)),
        },
        0xAA => match r.read_u8(6)? {
            0xE4 => decode_color_ack(r, device_id, frame, MessageKind::ColorQueryAck),
            0xE1 => decode_color_ack(r, device_id, frame, MessageKind::ColorSetAck),
            0xE2 => decode_color_ack(r, device_id, frame, MessageKind::TamperClearAck),
            _ => Err(unknown(frame)),
        },
        _ => Err(unknown(frame)),
    }
}

/// `header(1) + up to 10x{modAdd(1), modId(4), uCount(1)} + msgCode(4)`.
/// Modules are accepted only when `1 <= modAdd <= 5` and `modId != 0`.
fn decode_heartbeat(r: &FrameReader, device_id: &str, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mut offset = 1;
    let mut entries = Vec::new();
    while entries.len() < 10 && offset + 6 + 4 <= r.len() {
        let mod_add = r.read_u8(offset)?;
        let mod_id = r.read_u32_be(offset + 1)?;
        let u_count = r.read_u8(offset + 5)?;
        offset += 6;
        if (1..=5).contains(&mod_add) && mod_id != 0 {
            entries.push(json!({
                "mod_add": mod_add,
                "mod_id": mod_id.to_string(),
                "u_count": u_count,
            }));
        }
    }
    let msg_id = r.read_u32_be(r.len() - 4)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::Heartbeat).with_msg_id(msg_id);
    out.set_field("entries", entries);
    Ok(vec![out])
}

/// `0xBB + modAdd(1) + modId(4) + reserved(1) + uCount(1) + rfidCount(1) +
/// rfidCount x {uPos(1), alarm(1), uRfid(4 as hex)} + msgCode(4)`.
fn decode_rfid(r: &FrameReader, device_id: &str, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mod_add = r.read_u8(1)?;
    let mod_id = r.read_u32_be(2)?;
    let u_count = r.read_u8(7)?;
    let rfid_count = r.read_u8(8)? as usize;

    let mut entries = Vec::with_capacity(rfid_count);
    let mut offset = 9;
    for _ in 0..rfid_count {
        let u_pos = r.read_u8(offset)?;
        let alarm = r.read_u8(offset + 1)?;
        let u_rfid = r.read_hex(offset + 2, 4)?;
        offset += 6;
        entries.push(json!({
            "num": u_pos,
            "tag_code": u_rfid,
            "alarm": alarm,
        }));
    }
    let msg_id = r.read_u32_be(offset)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::Rfid)
        .with_module(u32::from(mod_add), mod_id.to_string())
        .with_msg_id(msg_id);
    out.set_field("u_count", u_count);
    out.set_field("rfid_count", rfid_count as u64);
    out.set_field("entries", entries);
    Ok(vec![out])
}

/// `modAdd(1) + modId(4) + up to 6x{addr(1), tempInt.tempFrac(2), humInt.humFrac(2)} + msgCode(4)`.
fn decode_temp_hum(r: &FrameReader, device_id: &str, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mod_add = r.read_u8(0)?;
    let mod_id = r.read_u32_be(1)?;

    let mut entries = Vec::new();
    let mut offset = 5;
    while entries.len() < 6 && offset + 5 + 4 <= r.len() {
        let addr = r.read_u8(offset)?;
        let temp = r.read_decimal_fixed2(offset + 1)?;
        let hum = r.read_decimal_fixed2(offset + 3)?;
        offset += 5;
        entries.push(json!({
            "num": addr,
            "temper_swot": temp,
            "humidity_swot": hum,
        }));
    }
    let msg_id = r.read_u32_be(r.len() - 4)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::TempHum)
        .with_module(u32::from(mod_add), mod_id.to_string())
        .with_msg_id(msg_id);
    out.set_field("entries", entries);
    let _ = frame;
    Ok(vec![out])
}

/// `modAdd(1) + modId(4) + up to 3x{addr(1), level(4 BE)} + msgCode(4)`.
fn decode_noise(r: &FrameReader, device_id: &str, frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mod_add = r.read_u8(0)?;
    let mod_id = r.read_u32_be(1)?;

    let mut entries = Vec::new();
    let mut offset = 5;
    while entries.len() < 3 && offset + 5 + 4 <= r.len() {
        let addr = r.read_u8(offset)?;
        let level = r.read_u32_be(offset + 1)?;
        offset += 5;
        entries.push(json!({
            "num": addr,
            "noise_lvl": level,
        }));
    }
    let msg_id = r.read_u32_be(r.len() - 4)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::Noise)
        .with_module(u32::from(mod_add), mod_id.to_string())
        .with_msg_id(msg_id);
    out.set_field("entries", entries);
    let _ = frame;
    Ok(vec![out])
}

/// `0xBA + modAdd(1) + modId(4) + status(1) + msgCode(4)`.
fn decode_door(r: &FrameReader, device_id: &str, _frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mod_add = r.read_u8(1)?;
    let mod_id = r.read_u32_be(2)?;
    let status = r.read_u8(6)?;
    let msg_id = r.read_u32_be(7)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::Door)
        .with_module(u32::from(mod_add), mod_id.to_string())
        .with_msg_id(msg_id);
    out.set_field("door_status", format!("0x{status:02x}"));
    Ok(vec![out])
}

/// `0xEF 0x01 + devType(2) + fw(4) + ip(4) + mask(4) + gateway(4) + mac(6) + msgCode(4)`.
fn decode_device_info(r: &FrameReader, device_id: &str, _frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let dev_type = r.read_u16_be(2)?;
    let fw = r.read_u32_be(4)?;
    let ip = r.read_ipv4(8)?;
    let mask = r.read_ipv4(12)?;
    let gateway = r.read_ipv4(16)?;
    let mac = r.read_mac(20)?;
    let msg_id = r.read_u32_be(26)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::DeviceInfo).with_msg_id(msg_id);
    out.set_field("dev_type", dev_type);
    out.set_field("fw_ver", fw.to_string());
    out.set_field("ip", ip);
    out.set_field("mask", mask);
    out.set_field("gateway", gateway);
    out.set_field("mac", mac);
    Ok(vec![out])
}

/// `0xEF 0x02 + repeated{modAdd(1), fw(6 BE)} until fewer than 7 bytes remain
/// before msgCode(4)`.
fn decode_module_info(r: &FrameReader, device_id: &str, _frame: &RawFrame) -> Result<Vec<DecoderOutput>, DecodeError> {
    let mut entries = Vec::new();
    let mut offset = 2;
    while r.len() >= offset + 7 + 4 {
        let mod_add = r.read_u8(offset)?;
        let fw_hi = r.read_u16_be(offset + 1)?;
        let fw_lo = r.read_u32_be(offset + 3)?;
        let fw = (u64::from(fw_hi) << 32) | u64::from(fw_lo);
        offset += 7;
        entries.push(json!({
            "mod_add": mod_add,
            "fw_ver": fw.to_string(),
        }));
    }
    let msg_id = r.read_u32_be(r.len() - 4)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, MessageKind::ModuleInfo).with_msg_id(msg_id);
    out.set_field("entries", entries);
    Ok(vec![out])
}

const COLOR_NAMES: [&str; 15] = [
    "off", "red", "purple", "yellow", "green", "cyan", "blue", "white", "red_f", "purple_f",
    "yellow_f", "green_f", "cyan_f", "blue_f", "white_f",
];

fn color_name(code: u8) -> String {
    COLOR_NAMES
        .get(code as usize)
        .map(|s| (*s).to_string())
        .unwrap_or_else(|| format!("0x{code:02x}"))
}

/// `0xAA + devId(4) + cmdResult(1) + cmd(1) + modNum(1) + n x color(1) + msgId(4)`.
/// `cmd` is `0xE4` for `ColorQueryAck`, `0xE1` for `ColorSetAck`, `0xE2` for
/// `TamperClearAck`; `cmdResult == 0xA1` means success.
fn decode_color_ack(
    r: &FrameReader,
    device_id: &str,
    _frame: &RawFrame,
    kind: MessageKind,
) -> Result<Vec<DecoderOutput>, DecodeError> {
    let cmd_result = r.read_u8(5)?;
    let mod_num = r.read_u8(7)?;
    if r.len() < 12 {
        return Err(DecodeError::FrameTruncated {
            offset: 8,
            needed: 4,
            len: r.len(),
        });
    }
    let n = r.len() - 12;
    let mut entries = Vec::with_capacity(n);
    for i in 0..n {
        let code = r.read_u8(8 + i)?;
        entries.push(json!({
            "num": i as u32 + 1,
            "color_val": code,
            "color_name": color_name(code),
        }));
    }
    let msg_id = r.read_u32_be(8 + n)?;

    let mut out = DecoderOutput::new(device_id, DeviceKind::B, kind)
        .with_module(u32::from(mod_num), mod_num.to_string())
        .with_msg_id(msg_id);
    out.set_field("entries", entries);
    out.set_field("ack_success", cmd_result == 0xA1);
    Ok(vec![out])
}
