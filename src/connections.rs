//! Process-wide connection registry and broadcast.
//!
//! Live WebSocket connections are tracked in a concurrent map keyed by
//! connection id. Iteration (`all`, `filter`, the broadcasts) works on a
//! snapshot of membership: a connection removed mid-iteration is simply a
//! failed send, and one added mid-iteration may be missed. Topic membership
//! lives on each connection handle; `publish` fans out through the snapshot.

use dashmap::DashMap;
use serde::Serialize;

use crate::error::Result;
use crate::ws::WsConnection;

/// The set of live connections for one server.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, WsConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: DashMap::new(),
        }
    }

    /// Track a connection; called when the upgrade is accepted.
    pub fn insert(&self, conn: WsConnection) {
        self.connections.insert(conn.id().to_string(), conn);
    }

    /// Drop a connection; called after the close handler has run.
    pub fn remove(&self, id: &str) {
        self.connections.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<WsConnection> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of every live connection.
    pub fn all(&self) -> Vec<WsConnection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of the connections matching a predicate.
    pub fn filter(&self, pred: impl Fn(&WsConnection) -> bool) -> Vec<WsConnection> {
        self.connections
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Send a JSON message to every live connection. The payload is
    /// serialized once. Returns the number of connections attempted.
    pub fn broadcast(&self, data: &impl Serialize) -> Result<usize> {
        let text = serde_json::to_string(data)?;
        let snapshot = self.all();
        let count = snapshot.len();
        for conn in snapshot {
            let _ = conn.send_text(&text);
        }
        Ok(count)
    }

    /// Send a binary payload to every live connection.
    pub fn broadcast_binary(&self, data: &[u8]) -> usize {
        let snapshot = self.all();
        let count = snapshot.len();
        for conn in snapshot {
            let _ = conn.send_binary(data.to_vec());
        }
        count
    }

    /// Send a JSON message to every subscriber of a topic. Returns the
    /// number of subscribers attempted.
    pub fn publish(&self, topic: &str, data: &impl Serialize) -> Result<usize> {
        let text = serde_json::to_string(data)?;
        Ok(self.publish_text(topic, &text, None))
    }

    /// Send a binary payload to every subscriber of a topic.
    pub fn publish_binary(&self, topic: &str, data: &[u8]) -> usize {
        let mut count = 0;
        for conn in self.all() {
            if conn.is_subscribed(topic) {
                let _ = conn.send_binary(data.to_vec());
                count += 1;
            }
        }
        count
    }

    /// Topic fan-out with an optional excluded connection (the publisher).
    pub(crate) fn publish_text(&self, topic: &str, text: &str, skip: Option<&str>) -> usize {
        let mut count = 0;
        for conn in self.all() {
            if skip == Some(conn.id()) {
                continue;
            }
            if conn.is_subscribed(topic) {
                let _ = conn.send_text(text);
                count += 1;
            }
        }
        count
    }
}
