//! An in-process publish/subscribe hub standing in for a real MQTT broker
//! in integration tests, the same role `MockWsServer` plays for the
//! forwarder/receiver WebSocket protocol: bind once per test, publish
//! frames, assert on what subscribers observed.
//!
//! It deliberately does not speak MQTT on the wire — `services/ingest`'s
//! rumqttc-backed adapter is the thing under test elsewhere; this hub lets
//! `gateway-core::Pipeline` and relay round-trips be exercised without a
//! network dependency.

use std::sync::Mutex;

use gateway_core::topic_matches;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Each `subscribe` call gets its own broadcast receiver filtered to its
/// pattern; publishing fans out to every live subscription, matching the
/// MQTT broker fan-out model the adapter assumes.
pub struct MockBroker {
    tx: broadcast::Sender<PublishedMessage>,
    published: Mutex<Vec<PublishedMessage>>,
}

impl MockBroker {
    pub fn start() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            tx,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        let msg = PublishedMessage {
            topic: topic.into(),
            payload: payload.into(),
        };
        self.published.lock().unwrap().push(msg.clone());
        // No subscribers is a normal state between test setup and the first
        // `subscribe` call.
        let _ = self.tx.send(msg);
    }

    /// A receiver that only yields messages whose topic matches `pattern`
    /// (MQTT wildcard syntax — see `gateway_core::topic_matches`).
    pub fn subscribe(&self, pattern: impl Into<String>) -> MockSubscription {
        MockSubscription {
            pattern: pattern.into(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::start()
    }
}

pub struct MockSubscription {
    pattern: String,
    rx: broadcast::Receiver<PublishedMessage>,
}

impl MockSubscription {
    /// Waits for the next message matching this subscription's pattern,
    /// skipping anything that doesn't match (mirroring a real broker, which
    /// never delivers a non-matching topic in the first place).
    pub async fn recv(&mut self) -> Option<PublishedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if topic_matches(&self.pattern, &msg.topic) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<PublishedMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if topic_matches(&self.pattern, &msg.topic) => return Some(msg),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
