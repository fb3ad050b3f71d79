//! Query Surface (C15): the read side the WebSocket/HTTP front door calls
//! into (spec §4.16). `QueryApi` is transport-free — `services/ingest`
//! wraps it with axum/tungstenite; here it's just data.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use canon_protocol::CanonicalRecord;

use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    New,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub state: ComponentState,
    pub detail: Option<String>,
}

/// Bounded per-device ring of recently-built records, fed by the pipeline at
/// fan-out time. Distinct from the State Engine's per-key `ChangeEvent`
/// history (C6): that one is keyed by `(deviceId, moduleNumber, kind)` and
/// only remembers diffs, not whole records, so it can't directly answer
/// "give me device GW1's last N canonical records" across all of its modules.
pub struct RecentRecords {
    inner: RwLock<HashMap<String, std::collections::VecDeque<CanonicalRecord>>>,
    cap: usize,
}

impl RecentRecords {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            cap,
        }
    }

    pub fn push(&self, record: CanonicalRecord) {
        let mut inner = self.inner.write().unwrap();
        let ring = inner.entry(record.device_id.clone()).or_default();
        ring.push_back(record);
        while ring.len() > self.cap {
            ring.pop_front();
        }
    }

    pub fn latest(&self, device_id: &str) -> Option<CanonicalRecord> {
        self.inner.read().unwrap().get(device_id).and_then(|r| r.back().cloned())
    }

    pub fn history(&self, device_id: &str, limit: usize) -> Vec<CanonicalRecord> {
        self.inner
            .read()
            .unwrap()
            .get(device_id)
            .map(|r| r.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn devices(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }
}

/// The read surface exposed to query transports (spec §4.16 / §7). Backed by
/// `Pipeline` in production; test doubles can implement it directly.
#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn get_latest_by_device(&self, device_id: &str) -> Option<CanonicalRecord>;
    async fn get_all_devices(&self) -> Vec<String>;
    async fn get_device_history(&self, device_id: &str, limit: usize) -> Vec<CanonicalRecord>;
    fn get_stats(&self) -> StatsSnapshot;
    fn get_component(&self, name: &str) -> Option<ComponentStatus>;
}
