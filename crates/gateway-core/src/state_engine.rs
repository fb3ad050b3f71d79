//! State Engine (C6): per-`(deviceId, moduleNumber, messageKind)` previous
//! state, diffed against each new record to produce `ChangeEvent`s.
//!
//! Concurrency: one update in flight per key at a time (spec §5). Keys are
//! stored as `Arc<tokio::sync::Mutex<StateCell>>` behind a `DashMap`, so the
//! dashmap shard guard is dropped before the (possibly `.await`-ing) lock is
//! taken — holding a dashmap guard across an await would risk blocking
//! unrelated keys sharing its shard.

use std::collections::HashMap;
use std::sync::Arc;

use canon_protocol::{
    ChangeAction, ChangeEvent, ColorPayload, DeviceInfoPayload, DoorPayload, HeartbeatPayload,
    ModuleInfoPayload, Payload, RfidPayload, RfidTag, StateCell, StateKey,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;

use crate::mapper::RfidEventHint;

/// Outcome of a single `StateEngine::update` call.
pub struct StateUpdate {
    /// The payload to carry on the outgoing canonical record. For RFID this
    /// is change-only (spec §4.6); for every other kind it is the full
    /// current payload, annotated with `changes` separately.
    pub payload: Payload,
    pub changes: Vec<ChangeEvent>,
    pub previous_state: Option<Payload>,
    pub has_changes: bool,
}

pub struct StateEngine {
    cells: DashMap<StateKey, Arc<Mutex<StateCell>>>,
}

impl StateEngine {
    pub fn new() -> Self {
        Self { cells: DashMap::new() }
    }

    fn cell_handle(&self, key: &StateKey) -> Arc<Mutex<StateCell>> {
        self.cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(StateCell::new())))
            .clone()
    }

    /// Explicit eviction of a key's state, per the State Cell lifecycle
    /// ("evicted on explicit clear" — spec §3).
    pub fn clear(&self, key: &StateKey) {
        self.cells.remove(key);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub async fn update(
        &self,
        key: &StateKey,
        payload: Payload,
        rfid_hints: Option<&[RfidEventHint]>,
        now: DateTime<Utc>,
    ) -> StateUpdate {
        let handle = self.cell_handle(key);
        let mut cell = handle.lock().await;

        let result = match &payload {
            Payload::Rfid(current) => diff_rfid(cell.previous_payload.as_ref(), current, rfid_hints, now),
            Payload::TempHum(current) => diff_temp_hum(&cell, current, now),
            Payload::Noise(current) => diff_noise(&cell, current, now),
            Payload::Door(current) => diff_door(&cell, current, now),
            Payload::Color(current) => diff_color(&cell, current, now),
            Payload::DeviceInfo(current) => diff_device_info(&cell, current, now),
            Payload::ModuleInfo(current) => diff_module_info(&cell, current, now),
            Payload::Heartbeat(_) => DiffResult {
                out_payload: payload.clone(),
                changes: vec![],
            },
        };

        let previous_state = cell.previous_payload.clone();
        cell.push_events(result.changes.clone());
        cell.previous_payload = Some(canonical_full_state(&payload, rfid_hints, cell.previous_payload.as_ref()));
        cell.previous_timestamp = Some(now);

        let has_changes = !result.changes.is_empty();
        StateUpdate {
            payload: result.out_payload,
            changes: result.changes,
            previous_state,
            has_changes,
        }
    }
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct DiffResult {
    out_payload: Payload,
    changes: Vec<ChangeEvent>,
}

/// What gets stored as the new "previous payload" for a key. For RFID this
/// is the *full* tag snapshot (never the change-only view the consumer
/// sees), so the next diff has a real baseline to compare against. Event
/// hints are merged onto the prior snapshot rather than replacing it,
/// since a notify frame only ever describes a delta.
fn canonical_full_state(payload: &Payload, rfid_hints: Option<&[RfidEventHint]>, previous: Option<&Payload>) -> Payload {
    match payload {
        Payload::Rfid(current) if rfid_hints.is_some() => {
            let hints = rfid_hints.unwrap();
            let mut map: HashMap<u32, RfidTag> = match previous {
                Some(Payload::Rfid(prev)) => prev.rfid_data.iter().cloned().map(|t| (t.position, t)).collect(),
                _ => HashMap::new(),
            };
            for hint in hints {
                if hint.attached {
                    map.insert(hint.position, RfidTag::new(hint.position, hint.rfid.clone(), hint.alarm));
                } else {
                    map.remove(&hint.position);
                }
            }
            let mut tags: Vec<_> = map.into_values().collect();
            tags.sort_by_key(|t| t.position);
            let rfid_count = tags.len() as u32;
            Payload::Rfid(RfidPayload {
                u_count: current.u_count,
                rfid_count,
                rfid_data: tags,
            })
        }
        other => other.clone(),
    }
}

fn tag_map(payload: &RfidPayload) -> HashMap<u32, &RfidTag> {
    payload.rfid_data.iter().map(|t| (t.position, t)).collect()
}

fn rfid_tag_json(tag: &RfidTag) -> serde_json::Value {
    json!({ "rfid": tag.rfid, "alarm": tag.alarm })
}

fn diff_rfid(
    previous: Option<&Payload>,
    current: &RfidPayload,
    hints: Option<&[RfidEventHint]>,
    now: DateTime<Utc>,
) -> DiffResult {
    let prev_rfid = match previous {
        Some(Payload::Rfid(p)) => Some(p),
        _ => None,
    };

    let mut changes = Vec::new();
    let mut entries = Vec::new();

    if let Some(hints) = hints {
        let mut sorted: Vec<&RfidEventHint> = hints.iter().collect();
        sorted.sort_by_key(|h| h.position);
        for hint in sorted {
            let action = if hint.attached {
                ChangeAction::Attached
            } else {
                ChangeAction::Detached
            };
            let mut event = ChangeEvent::new(hint.position, action, now);
            let tag = RfidTag::new(hint.position, hint.rfid.clone(), hint.alarm);
            if hint.attached {
                event.current = Some(rfid_tag_json(&tag));
            } else {
                event.previous = Some(rfid_tag_json(&tag));
            }
            changes.push(event);
            entries.push(tag);
        }
    } else {
        let prev_map = prev_rfid.map(tag_map).unwrap_or_default();
        let cur_map = tag_map(current);

        let mut positions: Vec<u32> = prev_map.keys().chain(cur_map.keys()).copied().collect();
        positions.sort_unstable();
        positions.dedup();

        for position in positions {
            match (prev_map.get(&position), cur_map.get(&position)) {
                (None, Some(cur)) => {
                    let mut event = ChangeEvent::new(position, ChangeAction::Attached, now);
                    event.current = Some(rfid_tag_json(cur));
                    changes.push(event);
                    entries.push((*cur).clone());
                }
                (Some(prev), None) => {
                    let mut event = ChangeEvent::new(position, ChangeAction::Detached, now);
                    event.previous = Some(rfid_tag_json(prev));
                    changes.push(event);
                    entries.push((*prev).clone());
                }
                (Some(prev), Some(cur)) => {
                    if prev.rfid != cur.rfid {
                        let mut event = ChangeEvent::new(position, ChangeAction::Changed, now);
                        event.previous = Some(rfid_tag_json(prev));
                        event.current = Some(rfid_tag_json(cur));
                        changes.push(event);
                        entries.push((*cur).clone());
                    } else if prev.alarm != cur.alarm {
                        let mut event = ChangeEvent::new(position, ChangeAction::AlarmChanged, now);
                        event.previous = Some(rfid_tag_json(prev));
                        event.current = Some(rfid_tag_json(cur));
                        changes.push(event);
                        entries.push((*cur).clone());
                    }
                }
                (None, None) => unreachable!(),
            }
        }
    }

    let rfid_count = entries.len() as u32;
    let out_payload = Payload::Rfid(RfidPayload {
        u_count: current.u_count,
        rfid_count,
        rfid_data: entries,
    });
    DiffResult { out_payload, changes }
}

const TEMP_HUM_THRESHOLD: f64 = 0.01;
const NOISE_THRESHOLD: f64 = 1.0;

fn diff_temp_hum(cell: &StateCell, current: &[canon_protocol::TempHumReading], now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => current
            .iter()
            .map(|r| {
                let mut e = ChangeEvent::new(r.position, ChangeAction::Initialized, now);
                e.current = Some(json!({"temperature": r.temperature, "humidity": r.humidity}));
                e
            })
            .collect(),
        Some(Payload::TempHum(prev)) => {
            let prev_map: HashMap<u32, _> = prev.iter().map(|r| (r.position, r)).collect();
            current
                .iter()
                .filter_map(|cur| {
                    let prev = prev_map.get(&cur.position)?;
                    let changed = (prev.temperature - cur.temperature).abs() > TEMP_HUM_THRESHOLD
                        || (prev.humidity - cur.humidity).abs() > TEMP_HUM_THRESHOLD;
                    if !changed {
                        return None;
                    }
                    let mut e = ChangeEvent::new(cur.position, ChangeAction::Updated, now);
                    e.previous = Some(json!({"temperature": prev.temperature, "humidity": prev.humidity}));
                    e.current = Some(json!({"temperature": cur.temperature, "humidity": cur.humidity}));
                    Some(e)
                })
                .collect()
        }
        Some(_) => vec![],
    };
    DiffResult {
        out_payload: Payload::TempHum(current.to_vec()),
        changes,
    }
}

fn diff_noise(cell: &StateCell, current: &[canon_protocol::NoiseReading], now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => current
            .iter()
            .map(|r| {
                let mut e = ChangeEvent::new(r.position, ChangeAction::Initialized, now);
                e.current = Some(json!({"level": r.level}));
                e
            })
            .collect(),
        Some(Payload::Noise(prev)) => {
            let prev_map: HashMap<u32, _> = prev.iter().map(|r| (r.position, r)).collect();
            current
                .iter()
                .filter_map(|cur| {
                    let prev = prev_map.get(&cur.position)?;
                    if (prev.level - cur.level).abs() <= NOISE_THRESHOLD {
                        return None;
                    }
                    let mut e = ChangeEvent::new(cur.position, ChangeAction::Updated, now);
                    e.previous = Some(json!({"level": prev.level}));
                    e.current = Some(json!({"level": cur.level}));
                    Some(e)
                })
                .collect()
        }
        Some(_) => vec![],
    };
    DiffResult {
        out_payload: Payload::Noise(current.to_vec()),
        changes,
    }
}

fn diff_door(cell: &StateCell, current: &DoorPayload, now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => {
            let mut e = ChangeEvent::new(0, ChangeAction::Initialized, now);
            e.current = Some(json!(current.status));
            vec![e]
        }
        Some(Payload::Door(prev)) if prev.status != current.status => {
            let mut e = ChangeEvent::new(0, ChangeAction::Changed, now);
            e.previous = Some(json!(prev.status));
            e.current = Some(json!(current.status));
            if let Some(prev_ts) = cell.previous_timestamp {
                e.duration_secs = Some((now - prev_ts).num_seconds());
            }
            vec![e]
        }
        Some(_) => vec![],
    };
    DiffResult {
        out_payload: Payload::Door(current.clone()),
        changes,
    }
}

fn diff_color(cell: &StateCell, current: &ColorPayload, now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => current
            .readings
            .iter()
            .map(|r| {
                let mut e = ChangeEvent::new(r.position, ChangeAction::Initialized, now);
                e.current = Some(json!({"color": r.color, "code": r.code}));
                e
            })
            .collect(),
        Some(Payload::Color(prev)) => {
            let prev_map: HashMap<u32, _> = prev.readings.iter().map(|r| (r.position, r)).collect();
            current
                .readings
                .iter()
                .filter_map(|cur| {
                    let prev = prev_map.get(&cur.position)?;
                    if prev.color == cur.color && prev.code == cur.code {
                        return None;
                    }
                    let mut e = ChangeEvent::new(cur.position, ChangeAction::Changed, now);
                    e.previous = Some(json!({"color": prev.color, "code": prev.code}));
                    e.current = Some(json!({"color": cur.color, "code": cur.code}));
                    Some(e)
                })
                .collect()
        }
        Some(_) => vec![],
    };
    DiffResult {
        out_payload: Payload::Color(current.clone()),
        changes,
    }
}

fn diff_device_info(cell: &StateCell, current: &DeviceInfoPayload, now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => vec![{
            let mut e = ChangeEvent::new(0, ChangeAction::Initialized, now);
            e.current = Some(json!(current));
            e
        }],
        Some(Payload::DeviceInfo(prev)) if prev != current => vec![{
            let mut e = ChangeEvent::new(0, ChangeAction::Set, now);
            e.previous = Some(json!(prev));
            e.current = Some(json!(current));
            e
        }],
        _ => vec![],
    };
    DiffResult {
        out_payload: Payload::DeviceInfo(current.clone()),
        changes,
    }
}

fn diff_module_info(cell: &StateCell, current: &ModuleInfoPayload, now: DateTime<Utc>) -> DiffResult {
    let changes = match &cell.previous_payload {
        None => current
            .modules
            .iter()
            .map(|m| {
                let mut e = ChangeEvent::new(u32::from(m.module_address), ChangeAction::Initialized, now);
                e.current = Some(json!({"firmware_version": m.firmware_version}));
                e
            })
            .collect(),
        Some(Payload::ModuleInfo(prev)) => {
            let prev_map: HashMap<u8, u64> = prev.modules.iter().map(|m| (m.module_address, m.firmware_version)).collect();
            current
                .modules
                .iter()
                .filter_map(|m| {
                    let prev_fw = prev_map.get(&m.module_address)?;
                    if *prev_fw == m.firmware_version {
                        return None;
                    }
                    let mut e = ChangeEvent::new(u32::from(m.module_address), ChangeAction::Updated, now);
                    e.previous = Some(json!({"firmware_version": prev_fw}));
                    e.current = Some(json!({"firmware_version": m.firmware_version}));
                    Some(e)
                })
                .collect()
        }
        Some(_) => vec![],
    };
    DiffResult {
        out_payload: Payload::ModuleInfo(current.clone()),
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_protocol::MessageKind;

    fn key() -> StateKey {
        StateKey::new("GW1", Some(2), MessageKind::Rfid)
    }

    fn rfid(tags: Vec<(u32, &str, u8)>) -> Payload {
        Payload::Rfid(RfidPayload {
            u_count: 24,
            rfid_count: tags.len() as u32,
            rfid_data: tags.into_iter().map(|(p, r, a)| RfidTag::new(p, r, a)).collect(),
        })
    }

    #[tokio::test]
    async fn rfid_new_tag_attached_scenario_1() {
        let engine = StateEngine::new();
        let now = Utc::now();
        let before = rfid(vec![(4, "dd395064", 0)]);
        engine.update(&key(), before, None, now).await;

        let after = rfid(vec![(4, "dd395064", 0), (17, "dd23b0b4", 0)]);
        let result = engine.update(&key(), after, None, now).await;

        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].position, 17);
        assert_eq!(result.changes[0].action, ChangeAction::Attached);
        match result.payload {
            Payload::Rfid(p) => {
                assert_eq!(p.rfid_data.len(), 1);
                assert_eq!(p.rfid_count, 1);
                assert_eq!(p.rfid_data[0].rfid, "dd23b0b4");
            }
            _ => panic!("expected rfid payload"),
        }
    }

    #[tokio::test]
    async fn identical_rfid_snapshot_yields_no_changes() {
        let engine = StateEngine::new();
        let now = Utc::now();
        let snap = rfid(vec![(4, "dd395064", 0)]);
        engine.update(&key(), snap.clone(), None, now).await;
        let result = engine.update(&key(), snap, None, now).await;
        assert!(result.changes.is_empty());
        assert!(!result.has_changes);
        match result.payload {
            Payload::Rfid(p) => assert!(p.rfid_data.is_empty()),
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn door_duration_scenario_4() {
        let engine = StateEngine::new();
        let k = StateKey::new("GW1", Some(2), MessageKind::Door);
        let t0 = Utc::now();
        engine
            .update(&k, Payload::Door(DoorPayload { status: "0x01".to_string() }), None, t0)
            .await;
        let t1 = t0 + chrono::Duration::seconds(42);
        let result = engine
            .update(&k, Payload::Door(DoorPayload { status: "0x00".to_string() }), None, t1)
            .await;
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].action, ChangeAction::Changed);
        assert_eq!(result.changes[0].duration_secs, Some(42));
    }

    #[tokio::test]
    async fn temp_hum_threshold_suppresses_tiny_changes() {
        let engine = StateEngine::new();
        let k = StateKey::new("GW1", Some(2), MessageKind::TempHum);
        let now = Utc::now();
        let reading = |t: f64, h: f64| {
            Payload::TempHum(vec![canon_protocol::TempHumReading {
                position: 10,
                temperature: t,
                humidity: h,
            }])
        };
        engine.update(&k, reading(27.41, 56.53), None, now).await;
        let tiny = engine.update(&k, reading(27.415, 56.531), None, now).await;
        assert!(tiny.changes.is_empty());
        let real = engine.update(&k, reading(28.0, 56.53), None, now).await;
        assert_eq!(real.changes.len(), 1);
    }

    #[tokio::test]
    async fn rfid_event_hints_are_preserved_as_actions() {
        let engine = StateEngine::new();
        let now = Utc::now();
        let hints = vec![crate::mapper::RfidEventHint {
            position: 9,
            rfid: "aa11bb22".to_string(),
            alarm: 0,
            attached: false,
        }];
        let result = engine
            .update(&key(), rfid(vec![]), Some(&hints), now)
            .await;
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].action, ChangeAction::Detached);
    }

    #[tokio::test]
    async fn different_keys_do_not_interfere() {
        let engine = StateEngine::new();
        let now = Utc::now();
        let k1 = StateKey::new("GW1", Some(1), MessageKind::Rfid);
        let k2 = StateKey::new("GW1", Some(2), MessageKind::Rfid);
        engine.update(&k1, rfid(vec![(1, "aa", 0)]), None, now).await;
        engine.update(&k2, rfid(vec![(1, "bb", 0)]), None, now).await;
        assert_eq!(engine.len(), 2);
    }
}
