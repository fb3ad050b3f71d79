//! MQTT wildcard matching and the subscription registry (part of C12). The
//! transport itself (connect/reconnect/publish) lives in `services/ingest`
//! since it needs an actual MQTT client crate; this module is the pure,
//! transport-free logic spec §4.12 describes: `+` matches one segment,
//! `#` matches zero or more remaining segments.

use std::collections::HashMap;
use std::sync::RwLock;

/// `+` matches exactly one topic segment; `#` matches the remainder
/// (including zero segments) and must be the last pattern segment.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').collect();
    let topic_segs: Vec<&str> = topic.split('/').collect();

    let mut pi = 0;
    let mut ti = 0;
    while pi < pattern_segs.len() {
        match pattern_segs[pi] {
            "#" => return true,
            "+" => {
                if ti >= topic_segs.len() {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
            literal => {
                if ti >= topic_segs.len() || topic_segs[ti] != literal {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }
    ti == topic_segs.len()
}

/// Read-many/write-one registry mapping a subscription id to its pattern.
/// `services/ingest` owns the actual handler dispatch; this tracks which
/// patterns are live so subscriptions can be replayed on reconnect.
#[derive(Default)]
pub struct SubscriptionRegistry {
    patterns: RwLock<HashMap<u64, String>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, pattern: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.patterns.write().unwrap().insert(id, pattern.into());
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.patterns.write().unwrap().remove(&id);
    }

    pub fn patterns(&self) -> Vec<String> {
        self.patterns.read().unwrap().values().cloned().collect()
    }

    /// All subscription patterns matching an incoming topic (dispatch fans
    /// out to every matching handler, spec §4.12).
    pub fn matching(&self, topic: &str) -> Vec<u64> {
        self.patterns
            .read()
            .unwrap()
            .iter()
            .filter(|(_, pattern)| topic_matches(pattern, topic))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_matches_one_segment() {
        assert!(topic_matches("FamilyB/+/TemHum", "FamilyB/GW1/TemHum"));
        assert!(!topic_matches("FamilyB/+/TemHum", "FamilyB/GW1/GW2/TemHum"));
    }

    #[test]
    fn hash_matches_zero_or_more_remaining_segments() {
        assert!(topic_matches("FamilyB/#", "FamilyB"));
        assert!(topic_matches("FamilyB/#", "FamilyB/GW1"));
        assert!(topic_matches("FamilyB/#", "FamilyB/GW1/TemHum"));
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(!topic_matches("FamilyB/GW1/TemHum", "FamilyB/GW2/TemHum"));
        assert!(topic_matches("FamilyB/GW1/TemHum", "FamilyB/GW1/TemHum"));
    }

    #[test]
    fn registry_replays_and_dispatches_to_matching_patterns() {
        let reg = SubscriptionRegistry::new();
        let a = reg.subscribe("FamilyB/#");
        let b = reg.subscribe("FamilyT/#");
        let matches = reg.matching("FamilyB/GW1/TemHum");
        assert_eq!(matches, vec![a]);
        reg.unsubscribe(a);
        assert!(reg.matching("FamilyB/GW1/TemHum").is_empty());
        assert_eq!(reg.patterns(), vec!["FamilyT/#".to_string()]);
        let _ = b;
    }
}
