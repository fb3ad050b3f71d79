//! Shared wire and canonical types for the rack telemetry middleware:
//! raw frames, decoder output, the canonical record shape, kind-specific
//! payloads, change events and state keys. No I/O and no decode logic
//! lives here — see `gateway-core` for that.

mod error;
mod frame;
mod payload;
mod record;
mod state;

pub use error::{DecodeError, StateError};
pub use frame::RawFrame;
pub use payload::{
    ColorPayload, ColorReading, DeviceInfoPayload, DeviceKind, DoorPayload, HeartbeatModule,
    HeartbeatPayload, MessageKind, ModuleInfoEntry, ModuleInfoPayload, NoiseReading, Payload,
    RfidPayload, RfidTag, TempHumReading,
};
pub use record::{CanonicalRecord, ChangeAction, ChangeEvent, DecoderOutput, Meta};
pub use state::{StateCell, StateKey};
