//! Gateway core: the transport-free decode → map → state → build → fan-out
//! pipeline plus its ambient stack (cache, write buffer, relay, stats,
//! query surface). `services/ingest` supplies the MQTT/DB/HTTP transports
//! that drive this crate; `services/emulator` drives it indirectly by
//! publishing synthetic frames at a real broker.

pub mod builder;
pub mod cache;
pub mod decode;
pub mod mapper;
pub mod mqtt;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod relay;
pub mod state_engine;
pub mod stats;
pub mod write_buffer;

pub use builder::CanonicalBuilder;
pub use cache::Cache;
pub use mapper::{FieldMapper, MappedRecord, RfidEventHint};
pub use mqtt::{topic_matches, SubscriptionRegistry};
pub use pipeline::{Component, Pipeline, PipelineConfig, PipelineError, PipelineEvent};
pub use query::{ComponentState, ComponentStatus, QueryApi, RecentRecords};
pub use relay::{MessageRelay, RelayError};
pub use state_engine::{StateEngine, StateUpdate};
pub use stats::{Stats, StatsSnapshot};
pub use write_buffer::{SinkError, WriteBuffer, WriteBufferConfig, WriteBufferStatsSnapshot, WriteSink};
