//! Shared test utilities for the rack telemetry middleware's integration
//! suite: an in-process broker standing in for MQTT, an in-memory write
//! sink, and canned raw frames for the spec's seed scenarios.

pub mod fake_sink;
pub mod frames;
pub mod mock_broker;

pub use fake_sink::FakeSink;
pub use mock_broker::{MockBroker, MockSubscription, PublishedMessage};
