//! Message Relay (C8): regex match on the inbound topic + `${gatewayId}`
//! template rewrite, republishing a cleaned canonical payload (spec §4.8).

use canon_protocol::CanonicalRecord;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid relay pattern for category {category:?}: {source}")]
    InvalidPattern { category: String, source: regex::Error },
}

/// Only the canonical fields survive relay — no raw topic/frame/quality
/// metadata (spec §4.8: "cleaned payload contains only the canonical fields").
#[derive(Debug, Serialize)]
pub struct CleanedPayload<'a> {
    pub device_id: &'a str,
    pub device_kind: canon_protocol::DeviceKind,
    pub module_number: Option<u32>,
    pub module_id: Option<&'a str>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: &'a canon_protocol::Payload,
    pub meta: CleanedMeta,
}

#[derive(Debug, Serialize)]
pub struct CleanedMeta {
    pub raw_topic: String,
}

pub struct RelayRule {
    category: String,
    source_pattern: Regex,
    target_template: String,
}

impl RelayRule {
    /// `source_pattern = "^<category>/([^/]+)/(.*)$"`, matching spec §4.8's
    /// rule-construction recipe.
    pub fn new(category: impl Into<String>, target_template: impl Into<String>) -> Result<Self, RelayError> {
        let category = category.into();
        let pattern = format!("^{}/([^/]+)/(.*)$", regex::escape(&category));
        let source_pattern = Regex::new(&pattern).map_err(|source| RelayError::InvalidPattern {
            category: category.clone(),
            source,
        })?;
        Ok(Self {
            category,
            source_pattern,
            target_template: target_template.into(),
        })
    }

    fn matches(&self, topic: &str) -> Option<String> {
        let caps = self.source_pattern.captures(topic)?;
        let gateway_id = caps.get(1)?.as_str();
        Some(self.target_template.replace("${gatewayId}", gateway_id))
    }
}

/// Holds an ordered set of relay rules and a loop-prevention prefix list.
pub struct MessageRelay {
    rules: Vec<RelayRule>,
    /// Known relay target prefixes — topics under these are suppressed at
    /// ingest to prevent republish loops (spec §4.8).
    target_prefixes: Vec<String>,
}

impl MessageRelay {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            target_prefixes: Vec::new(),
        }
    }

    pub fn from_config(patterns: impl IntoIterator<Item = (String, String)>, topic_prefix: impl Into<String>) -> Result<Self, RelayError> {
        let mut relay = Self::new();
        relay.target_prefixes.push(topic_prefix.into());
        for (category, template) in patterns {
            relay.add_rule(category, template)?;
        }
        Ok(relay)
    }

    pub fn add_rule(&mut self, category: impl Into<String>, target_template: impl Into<String>) -> Result<(), RelayError> {
        self.rules.push(RelayRule::new(category, target_template)?);
        Ok(())
    }

    /// Whether an inbound topic should be skipped entirely because it was
    /// produced by the relay itself (loop prevention).
    pub fn is_self_generated(&self, topic: &str) -> bool {
        self.target_prefixes.iter().any(|p| topic.starts_with(p.as_str()))
    }

    /// Match `record.meta.raw_topic` against every rule in order; the
    /// first match wins. Returns `None` if no rule matches.
    pub fn route(&self, record: &CanonicalRecord) -> Option<(String, Vec<u8>)> {
        for rule in &self.rules {
            if let Some(target_topic) = rule.matches(&record.meta.raw_topic) {
                let cleaned = CleanedPayload {
                    device_id: &record.device_id,
                    device_kind: record.device_kind,
                    module_number: record.module_number,
                    module_id: record.module_id.as_deref(),
                    timestamp: record.timestamp,
                    payload: &record.payload,
                    meta: CleanedMeta {
                        raw_topic: record.meta.raw_topic.clone(),
                    },
                };
                let payload = serde_json::to_vec(&cleaned).unwrap_or_default();
                return Some((target_topic, payload));
            }
        }
        None
    }
}

impl Default for MessageRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canon_protocol::{DeviceKind, Meta, MessageKind, Payload};
    use chrono::Utc;

    fn record(topic: &str) -> CanonicalRecord {
        CanonicalRecord {
            device_id: "GW1".to_string(),
            device_kind: DeviceKind::B,
            message_kind: MessageKind::Door,
            module_number: Some(1),
            module_id: None,
            timestamp: Utc::now(),
            payload: Payload::Door(canon_protocol::DoorPayload { status: "open".to_string() }),
            meta: Meta {
                raw_topic: topic.to_string(),
                raw_frame: Some("deadbeef".to_string()),
                msg_id: None,
                quality_score: 100.0,
                has_changes: false,
            },
            changes: None,
            previous_state: None,
        }
    }

    #[test]
    fn rewrites_topic_and_strips_raw_frame_scenario_6() {
        let mut relay = MessageRelay::new();
        relay.add_rule("FamilyB", "new/${gatewayId}/TemHum").unwrap();
        let (topic, payload) = relay.route(&record("FamilyB/GW1/TemHum")).unwrap();
        assert_eq!(topic, "new/GW1/TemHum");
        let text = String::from_utf8(payload).unwrap();
        assert!(!text.contains("deadbeef"));
        assert!(!text.contains("quality_score"));
    }

    #[test]
    fn non_matching_topic_is_not_routed() {
        let relay = MessageRelay::new();
        assert!(relay.route(&record("FamilyB/GW1/TemHum")).is_none());
    }

    #[test]
    fn relay_output_topic_is_suppressed_at_ingest() {
        let relay = MessageRelay::from_config([("FamilyB".to_string(), "new/${gatewayId}/TemHum".to_string())], "new/").unwrap();
        assert!(relay.is_self_generated("new/GW1/TemHum"));
        assert!(!relay.is_self_generated("FamilyB/GW1/TemHum"));
    }
}
