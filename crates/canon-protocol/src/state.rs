use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::payload::{MessageKind, Payload};
use crate::record::ChangeEvent;

/// The key under which per-module state is tracked (spec §3/GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub device_id: String,
    pub module_number: Option<u32>,
    pub message_kind: MessageKind,
}

impl StateKey {
    pub fn new(device_id: impl Into<String>, module_number: Option<u32>, message_kind: MessageKind) -> Self {
        Self {
            device_id: device_id.into(),
            module_number,
            message_kind,
        }
    }
}

/// Per-key state: the last canonical payload plus a bounded FIFO change
/// history (cap 100, spec §3 "State Cell").
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    pub previous_payload: Option<Payload>,
    pub previous_timestamp: Option<DateTime<Utc>>,
    pub history: VecDeque<ChangeEvent>,
}

impl StateCell {
    pub const MAX_HISTORY: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Append `events` to the bounded FIFO history, evicting the oldest
    /// entries once the cap is exceeded.
    pub fn push_events(&mut self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            self.history.push_back(event);
        }
        while self.history.len() > Self::MAX_HISTORY {
            self.history.pop_front();
        }
    }
}
