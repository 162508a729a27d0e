//! Event system for streaming notifications
//!
//! Provides:
//! - `StreamEvent`, an owned value for every observer callback
//! - `EventDispatcher`, an observer that republishes callbacks on a
//!   broadcast channel for async consumers

use crate::core::listener::StreamObserver;
use crate::data::{LineError, PauseReason, RecoveryReport, StatusSnapshot, StreamProgress};
use crate::error::StreamError;
use tokio::sync::broadcast;

/// Streaming event types
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Progress counters changed
    Progress(StreamProgress),
    /// Job completed
    Complete(StreamProgress),
    /// Session-level error
    Error(StreamError),
    /// Line acknowledged with `ok`
    LineSuccess {
        /// Sequence index of the line
        index: usize,
        /// Line text
        text: String,
    },
    /// Line rejected or failed
    LineError(LineError),
    /// Send loop halted
    Paused(PauseReason),
    /// Send loop resumed
    Resumed,
    /// Status report parsed
    Status(StatusSnapshot),
    /// Soft-reset recovery performed
    Recovered(RecoveryReport),
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamEvent::Progress(p) => write!(
                f,
                "Progress {}/{} acknowledged, {} sent, {} bytes buffered",
                p.acknowledged, p.total, p.sent, p.buffer_used
            ),
            StreamEvent::Complete(p) => write!(f, "Complete: {} lines", p.total),
            StreamEvent::Error(e) => write!(f, "Error: {}", e),
            StreamEvent::LineSuccess { index, text } => write!(f, "ok {} '{}'", index, text),
            StreamEvent::LineError(e) => write!(f, "Line error: {}", e),
            StreamEvent::Paused(reason) => write!(f, "Paused: {}", reason),
            StreamEvent::Resumed => write!(f, "Resumed"),
            StreamEvent::Status(s) => write!(
                f,
                "Status {} MPos {} F{} S{}",
                s.state, s.machine_position, s.feed_rate, s.spindle_speed
            ),
            StreamEvent::Recovered(r) => write!(
                f,
                "Recovered: resuming at line {}, {} lines requeued",
                r.resume_from, r.requeued
            ),
        }
    }
}

/// Event dispatcher for publishing stream events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for stream events.
    tx: broadcast::Sender<StreamEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers; returns the receiver count
    pub fn publish(&self, event: StreamEvent) -> usize {
        // No receivers is not an error for a fire-and-forget notification.
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StreamObserver for EventDispatcher {
    fn on_progress(&self, progress: &StreamProgress) {
        self.publish(StreamEvent::Progress(*progress));
    }

    fn on_complete(&self, progress: &StreamProgress) {
        self.publish(StreamEvent::Complete(*progress));
    }

    fn on_error(&self, error: &StreamError) {
        self.publish(StreamEvent::Error(error.clone()));
    }

    fn on_line_success(&self, index: usize, text: &str) {
        self.publish(StreamEvent::LineSuccess {
            index,
            text: text.to_string(),
        });
    }

    fn on_line_error(&self, error: &LineError) {
        self.publish(StreamEvent::LineError(error.clone()));
    }

    fn on_pause(&self, reason: &PauseReason) {
        self.publish(StreamEvent::Paused(reason.clone()));
    }

    fn on_resume(&self) {
        self.publish(StreamEvent::Resumed);
    }

    fn on_status_update(&self, status: &StatusSnapshot) {
        self.publish(StreamEvent::Status(status.clone()));
    }

    fn on_recovery(&self, report: &RecoveryReport) {
        self.publish(StreamEvent::Recovered(*report));
    }
}
