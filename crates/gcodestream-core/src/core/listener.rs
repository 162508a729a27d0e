//! Stream observer interface
//!
//! Defines the observer trait for streaming session notifications and the
//! registry a session uses to fan them out.

use crate::data::{LineError, PauseReason, RecoveryReport, StatusSnapshot, StreamProgress};
use crate::error::StreamError;
use std::sync::Arc;
use uuid::Uuid;

/// Handle for a registered stream observer.
///
/// Uniquely identifies an observer registration. Can be used to unregister
/// the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub Uuid);

impl ObserverHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Observer trait for streaming session events
///
/// Callbacks run on the engine's event loop and must return quickly.
/// Every method has an empty default so implementors pick what they need.
pub trait StreamObserver: Send + Sync {
    /// Called after every send and every acknowledgment
    fn on_progress(&self, _progress: &StreamProgress) {}

    /// Called once when every line has been sent and acknowledged
    fn on_complete(&self, _progress: &StreamProgress) {}

    /// Called for session-level failures (alarms, timeouts, transport loss)
    fn on_error(&self, _error: &StreamError) {}

    /// Called when a line is acknowledged with `ok`
    fn on_line_success(&self, _index: usize, _text: &str) {}

    /// Called when a line is rejected or fails terminally
    fn on_line_error(&self, _error: &LineError) {}

    /// Called when the send loop is halted
    fn on_pause(&self, _reason: &PauseReason) {}

    /// Called when a paused session resumes
    fn on_resume(&self) {}

    /// Called for every parsed status report
    fn on_status_update(&self, _status: &StatusSnapshot) {}

    /// Called after a soft-reset recovery rewound the send cursor
    fn on_recovery(&self, _report: &RecoveryReport) {}
}

/// Registered observers of one session
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<(ObserverHandle, Arc<dyn StreamObserver>)>,
}

impl ObserverSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer and return its handle
    pub fn register(&mut self, observer: Arc<dyn StreamObserver>) -> ObserverHandle {
        let handle = ObserverHandle::new();
        self.observers.push((handle, observer));
        tracing::debug!("Observer {:?} registered", handle.0);
        handle
    }

    /// Remove an observer; returns true if it was registered
    pub fn unregister(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        before != self.observers.len()
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Invoke `f` on every observer in registration order
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn StreamObserver),
    {
        for (_, observer) in &self.observers {
            f(observer.as_ref());
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.observers.len())
            .finish()
    }
}
