use serde::{Deserialize, Serialize};

/// The two gateway protocol families this middleware understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Compact binary/hex framed protocol.
    B,
    /// Structured text protocol.
    T,
}

/// The message category a decoder classifies a frame into. `ColorQueryAck`,
/// `ColorSetAck` and `TamperClearAck` are family-B-only acknowledgement
/// kinds; the Canonical Record Builder folds all three onto the `Color`
/// payload shape (see `ColorPayload::ack_success`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Rfid,
    TempHum,
    Noise,
    Door,
    Color,
    Heartbeat,
    DeviceInfo,
    ModuleInfo,
    ColorQueryAck,
    ColorSetAck,
    TamperClearAck,
}

impl MessageKind {
    /// Whether this kind folds onto the `Color` canonical payload shape.
    pub fn is_color_family(self) -> bool {
        matches!(
            self,
            MessageKind::Color
                | MessageKind::ColorQueryAck
                | MessageKind::ColorSetAck
                | MessageKind::TamperClearAck
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidTag {
    pub position: u32,
    pub rfid: String,
    pub alarm: u8,
    /// Always `"attached"` per spec §3 — the canonical shape only ever
    /// describes currently-attached tags; detachment is expressed as a
    /// `ChangeEvent`, not a payload entry.
    pub state: String,
}

impl RfidTag {
    pub fn new(position: u32, rfid: impl Into<String>, alarm: u8) -> Self {
        Self {
            position,
            rfid: rfid.into(),
            alarm,
            state: "attached".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidPayload {
    pub u_count: u32,
    pub rfid_count: u32,
    pub rfid_data: Vec<RfidTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempHumReading {
    pub position: u32,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseReading {
    pub position: u32,
    pub level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoorPayload {
    /// `"open"`, `"closed"`, or `"0x<hex>"` for an unrecognized status byte.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorReading {
    pub position: u32,
    pub color: String,
    pub code: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorPayload {
    pub readings: Vec<ColorReading>,
    /// Set for `ColorQueryAck` / `ColorSetAck` / `TamperClearAck` frames;
    /// `None` for a plain `Color` family-T event.
    pub ack_success: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatModule {
    pub module_address: u8,
    pub module_id: String,
    pub u_count: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub modules: Vec<HeartbeatModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfoPayload {
    pub device_type: u16,
    pub firmware_version: u32,
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfoEntry {
    pub module_address: u8,
    pub firmware_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfoPayload {
    pub modules: Vec<ModuleInfoEntry>,
}

/// Kind-specific canonical payload shapes, tagged on `message_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Rfid(RfidPayload),
    TempHum(Vec<TempHumReading>),
    Noise(Vec<NoiseReading>),
    Door(DoorPayload),
    Color(ColorPayload),
    Heartbeat(HeartbeatPayload),
    DeviceInfo(DeviceInfoPayload),
    ModuleInfo(ModuleInfoPayload),
}

impl Payload {
    pub fn message_kind(&self) -> MessageKind {
        match self {
            Payload::Rfid(_) => MessageKind::Rfid,
            Payload::TempHum(_) => MessageKind::TempHum,
            Payload::Noise(_) => MessageKind::Noise,
            Payload::Door(_) => MessageKind::Door,
            Payload::Color(_) => MessageKind::Color,
            Payload::Heartbeat(_) => MessageKind::Heartbeat,
            Payload::DeviceInfo(_) => MessageKind::DeviceInfo,
            Payload::ModuleInfo(_) => MessageKind::ModuleInfo,
        }
    }
}
