//! Public facade for the rack telemetry middleware: re-exports the wire and
//! canonical types (`canon-protocol`) alongside the transport-free pipeline
//! (`gateway-core`) under one crate, so an embedder can depend on a single
//! path instead of pulling in each workspace member directly.
//!
//! Transport (MQTT, Postgres, process signals) lives in `services/ingest`;
//! the synthetic traffic generator lives in `services/emulator`. Neither is
//! re-exported here — this crate stays transport-free, matching
//! `gateway-core`'s own boundary.

pub use canon_protocol::*;
pub use gateway_core::*;
