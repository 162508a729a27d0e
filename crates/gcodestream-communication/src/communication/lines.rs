//! Inbound line plumbing
//!
//! Turns the raw byte stream read from a controller into text lines and
//! hands each line to every subscriber over its own channel.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one inbound-line subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// A live subscription to a transport's inbound lines
#[derive(Debug)]
pub struct LineSubscription {
    /// Handle used to unsubscribe
    pub id: SubscriptionId,
    /// Lines in arrival order
    pub lines: mpsc::UnboundedReceiver<String>,
}

/// Distributes inbound lines to any number of subscribers
#[derive(Debug, Default)]
pub struct LineFanout {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<String>>>,
}

impl LineFanout {
    /// Create a fanout with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber
    pub fn subscribe(&self) -> LineSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();
        self.subscribers.lock().insert(id, tx);
        tracing::debug!("Line subscription {} added", id);
        LineSubscription { id, lines: rx }
    }

    /// Remove a subscriber; returns true if it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!("Line subscription {} removed", id);
        }
        removed
    }

    /// Deliver a line to every subscriber, pruning closed receivers
    pub fn publish(&self, line: &str) {
        self.subscribers
            .lock()
            .retain(|_, tx| tx.send(line.to_string()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber so their receivers observe end of stream
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}

/// Reassembles newline-terminated lines from arbitrary read chunks
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every completed, trimmed, non-empty line
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Bytes received after the last newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
