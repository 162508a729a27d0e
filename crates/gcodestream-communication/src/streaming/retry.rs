//! Acknowledgment timeout bookkeeping
//!
//! At most one deadline is armed at a time: either the primary wait for
//! the oldest outstanding line, or the shorter probe window that follows a
//! status query. Arming always replaces the previous deadline.

use std::time::Duration;
use tokio::time::Instant;

/// Which wait is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Waiting for the oldest line's acknowledgment
    Ack,
    /// Waiting for any sign of life after a status probe
    Probe,
}

/// An armed deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    /// Wait kind
    pub kind: TimerKind,
    /// When it expires
    pub deadline: Instant,
}

/// Single-slot timeout controller
#[derive(Debug, Default, Clone)]
pub struct TimeoutController {
    armed: Option<ArmedTimer>,
}

impl TimeoutController {
    /// Create a disarmed controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the primary wait, `window` after `from`
    pub fn arm_ack(&mut self, from: Instant, window: Duration) {
        self.arm(TimerKind::Ack, from + window);
    }

    /// Arm the probe wait, `window` after `from`
    pub fn arm_probe(&mut self, from: Instant, window: Duration) {
        self.arm(TimerKind::Probe, from + window);
    }

    fn arm(&mut self, kind: TimerKind, deadline: Instant) {
        if let Some(prev) = self.armed.replace(ArmedTimer { kind, deadline }) {
            tracing::trace!("Replacing armed {:?} timer", prev.kind);
        }
    }

    /// Disarm
    pub fn clear(&mut self) {
        self.armed = None;
    }

    /// Current deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|t| t.deadline)
    }

    /// Kind of the armed wait
    pub fn kind(&self) -> Option<TimerKind> {
        self.armed.map(|t| t.kind)
    }

    /// Disarm and return the kind if the deadline has passed
    pub fn take_expired(&mut self, now: Instant) -> Option<TimerKind> {
        match self.armed {
            Some(timer) if timer.deadline <= now => {
                self.armed = None;
                Some(timer.kind)
            }
            _ => None,
        }
    }
}
