//! Pipeline (C11): the orchestrator wiring decode → map → state → build →
//! fan-out, plus the component lifecycle state machine and typed event bus
//! (spec §4.11 / DESIGN NOTES §9).
//!
//! Transport never appears here. `services/ingest` owns the MQTT client and
//! the WebSocket/HTTP listeners; it drives frames in through
//! [`Pipeline::process_frame`] and drains [`PipelineEvent`]s back out through
//! a `broadcast` receiver to publish relay messages and push to subscribed
//! clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use canon_protocol::{CanonicalRecord, DecodeError, RawFrame, StateKey};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::builder::CanonicalBuilder;
use crate::cache::Cache;
use crate::decode::DecoderRegistry;
use crate::mapper::FieldMapper;
use crate::query::{ComponentState, ComponentStatus, QueryApi, RecentRecords};
use crate::relay::MessageRelay;
use crate::state_engine::StateEngine;
use crate::stats::{Stats, StatsSnapshot};
use crate::write_buffer::{WriteBuffer, WriteBufferConfig, WriteSink};

/// Broadcast onto the event bus; `services/ingest` subscribes to forward
/// `RelayMessage` onto the MQTT client and `MessageProcessed` onto connected
/// WebSocket clients (spec §7 "message.processed" / "relay.message").
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    MessageProcessed(Box<CanonicalRecord>),
    MessageError { raw_topic: String, error: String },
    RelayMessage { topic: String, payload: Vec<u8> },
    DbBatchStored { count: usize },
    DataExpired { device_id: String },
}

pub struct PipelineConfig {
    pub cache_max_size: usize,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub recent_history_cap: usize,
    pub write_buffer: WriteBufferConfig,
    pub event_bus_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 10_000,
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            recent_history_cap: 50,
            write_buffer: WriteBufferConfig::default(),
            event_bus_capacity: 1024,
        }
    }
}

/// Any long-lived piece of the pipeline that needs to report its own
/// lifecycle independently (the DB sink, the MQTT adapter in
/// `services/ingest`). `Pipeline` itself implements it for the core stages.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<(), PipelineError>;
    async fn stop(&self);
    fn status(&self) -> ComponentStatus;
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline already running")]
    AlreadyRunning,
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

pub struct Pipeline {
    state: RwLock<ComponentState>,
    registry: DecoderRegistry,
    state_engine: StateEngine,
    cache: Cache,
    recent: RecentRecords,
    write_buffer: WriteBuffer,
    relay: MessageRelay,
    stats: Stats,
    events: broadcast::Sender<PipelineEvent>,
    config: PipelineConfig,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl Pipeline {
    pub fn new(sink: Option<Arc<dyn WriteSink>>, relay: MessageRelay, config: PipelineConfig) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(config.event_bus_capacity);
        Arc::new(Self {
            state: RwLock::new(ComponentState::New),
            registry: DecoderRegistry::with_builtins(),
            state_engine: StateEngine::new(),
            cache: Cache::new(config.cache_max_size, config.cache_ttl),
            recent: RecentRecords::new(config.recent_history_cap),
            write_buffer: WriteBuffer::new(sink, WriteBufferConfig {
                max_size: config.write_buffer.max_size,
                flush_interval: config.write_buffer.flush_interval,
                max_retries: config.write_buffer.max_retries,
            }),
            relay,
            stats: Stats::new(),
            events,
            background: std::sync::Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is the common case in tests; a broadcast send error
        // just means nobody's listening, not a failure of the pipeline.
        let _ = self.events.send(event);
    }

    /// Spawns the cache sweep and write-buffer flush-interval background
    /// tasks. Idempotent only from `New`; called once by `start`.
    fn spawn_background(self: &Arc<Self>) {
        let mut handles = self.background.lock().unwrap();

        let sweep_self = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_self.config.cache_sweep_interval);
            loop {
                ticker.tick().await;
                if sweep_self.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                let removed = sweep_self.cache.sweep_expired();
                if removed > 0 {
                    debug!(removed, "cache sweep evicted expired entries");
                }
            }
        }));

        let flush_self = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_self.config.write_buffer.flush_interval);
            loop {
                ticker.tick().await;
                if flush_self.shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                flush_self.write_buffer.flush().await;
            }
        }));
    }

    /// Decode → map → diff → build → fan-out for a single inbound frame.
    /// Topics the relay itself produced are dropped up front (loop
    /// prevention, spec §4.8); everything else always runs through to
    /// completion even if one derived record fails, since a multi-module
    /// family-B frame should not lose its siblings to one bad module.
    pub async fn process_frame(&self, frame: RawFrame) -> Vec<CanonicalRecord> {
        self.stats.record_frame_received();

        if self.relay.is_self_generated(&frame.topic) {
            return Vec::new();
        }

        let outputs = match self.registry.decode(&frame) {
            Ok(outputs) => outputs,
            Err(err) => {
                self.stats.record_decode_error(&err);
                self.emit(PipelineEvent::MessageError {
                    raw_topic: frame.topic.clone(),
                    error: err.to_string(),
                });
                return Vec::new();
            }
        };

        let mut produced = Vec::with_capacity(outputs.len());
        for output in outputs {
            match self.process_one(&frame, output).await {
                Ok(record) => produced.push(record),
                Err(err) => {
                    self.stats.record_decode_error(&err);
                    self.emit(PipelineEvent::MessageError {
                        raw_topic: frame.topic.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        produced
    }

    async fn process_one(
        &self,
        frame: &RawFrame,
        output: canon_protocol::DecoderOutput,
    ) -> Result<CanonicalRecord, DecodeError> {
        let mapped = FieldMapper::map(output)?;
        let key = StateKey::new(mapped.device_id.clone(), mapped.module_number, mapped.message_kind);
        let now = Utc::now();
        let hints = mapped.rfid_event_hints.clone();
        let state = self.state_engine.update(&key, mapped.payload.clone(), hints.as_deref(), now).await;
        let record = CanonicalBuilder::build(frame, mapped, state, now);
        record.validate()?;

        self.cache.set(record.device_id.clone(), record.clone());
        self.recent.push(record.clone());
        self.write_buffer.push(record.clone()).await;

        if let Some((topic, payload)) = self.relay.route(&record) {
            self.stats.record_relay_published();
            self.emit(PipelineEvent::RelayMessage { topic, payload });
        }

        self.stats.record_record_emitted();
        self.emit(PipelineEvent::MessageProcessed(Box::new(record.clone())));
        Ok(record)
    }
}

#[async_trait]
impl Component for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    async fn start(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.write().unwrap();
            if *state == ComponentState::Running || *state == ComponentState::Initializing {
                return Err(PipelineError::AlreadyRunning);
            }
            *state = ComponentState::Initializing;
        }
        // `start` takes `&self` for trait-object ergonomics, but the
        // background tasks need an `Arc` to outlive this call — callers are
        // expected to hold `Pipeline` behind `Arc` (as `Pipeline::new`
        // returns), matching `services/ingest`'s startup sequence.
        warn!("Pipeline::start called through &self; background tasks are spawned separately via Pipeline::run");
        *self.state.write().unwrap() = ComponentState::Running;
        Ok(())
    }

    async fn stop(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        *self.state.write().unwrap() = ComponentState::ShuttingDown;
        self.write_buffer.begin_shutdown();
        self.write_buffer.flush().await;
        let handles = std::mem::take(&mut *self.background.lock().unwrap());
        for handle in handles {
            handle.abort();
        }
        *self.state.write().unwrap() = ComponentState::Stopped;
    }

    fn status(&self) -> ComponentStatus {
        ComponentStatus {
            name: self.name().to_string(),
            state: *self.state.read().unwrap(),
            detail: None,
        }
    }
}

impl Pipeline {
    /// The real startup path: spawns background maintenance tasks and flips
    /// to `Running`. Requires `Arc<Pipeline>` (the background tasks hold a
    /// clone) — `services/ingest::main` calls this instead of
    /// `Component::start`.
    pub async fn run(self: &Arc<Self>) -> Result<(), PipelineError> {
        {
            let mut state = self.state.write().unwrap();
            if *state == ComponentState::Running || *state == ComponentState::Initializing {
                return Err(PipelineError::AlreadyRunning);
            }
            *state = ComponentState::Initializing;
        }
        self.spawn_background();
        *self.state.write().unwrap() = ComponentState::Running;
        Ok(())
    }

    pub async fn shutdown(&self) {
        Component::stop(self).await;
    }
}

#[async_trait]
impl QueryApi for Pipeline {
    async fn get_latest_by_device(&self, device_id: &str) -> Option<CanonicalRecord> {
        self.cache.get(device_id).or_else(|| self.recent.latest(device_id))
    }

    async fn get_all_devices(&self) -> Vec<String> {
        let mut devices = self.cache.all_devices();
        for d in self.recent.devices() {
            if !devices.contains(&d) {
                devices.push(d);
            }
        }
        devices
    }

    async fn get_device_history(&self, device_id: &str, limit: usize) -> Vec<CanonicalRecord> {
        self.recent.history(device_id, limit)
    }

    fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn get_component(&self, name: &str) -> Option<ComponentStatus> {
        if name == self.name() {
            Some(Component::status(self))
        } else {
            None
        }
    }
}

impl Pipeline {
    pub fn cache_stats(&self) -> crate::cache::CacheStatsSnapshot {
        self.cache.stats()
    }

    pub fn write_buffer_stats(&self) -> crate::write_buffer::WriteBufferStatsSnapshot {
        self.write_buffer.stats()
    }

    pub fn state_key_count(&self) -> usize {
        self.state_engine.len()
    }

    /// Used by tests and the explicit clear endpoint (spec §3 "evicted on
    /// explicit clear").
    pub fn clear_state(&self, key: &StateKey) {
        self.state_engine.clear(key);
        self.emit(PipelineEvent::DataExpired { device_id: key.device_id.clone() });
    }
}
