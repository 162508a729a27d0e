//! Streaming session records
//!
//! Value types exchanged between the streaming engine and its observers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level state of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing running; commands may be loaded
    #[default]
    Idle,
    /// Send loop active
    Sending,
    /// Send loop halted; outstanding commands may still be acknowledged
    Paused,
    /// Every command was sent and acknowledged
    Completed,
    /// A command exhausted its retry bound
    Failed,
    /// Torn down by `stop()`; requires a fresh load before restarting
    Stopped,
}

impl SessionState {
    /// Sending or paused
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Sending | SessionState::Paused)
    }

    /// Completed, failed, or stopped
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Stopped
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Sending => write!(f, "Sending"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Completed => write!(f, "Completed"),
            SessionState::Failed => write!(f, "Failed"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Why the send loop was halted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// Requested by the operator; the only reason that issues a feed hold
    User,
    /// The controller reported an alarm
    Alarm(String),
    /// Sending a line failed after the transport retry bound
    TransportError(String),
    /// The controller rejected a line with an error code configured as fatal
    FatalLineError {
        /// Sequence index of the rejected line
        index: usize,
        /// Controller error code
        code: u16,
    },
    /// A line exhausted its timeout retries
    RetriesExhausted {
        /// Sequence index of the stalled line
        index: usize,
    },
    /// The transport disconnected
    ConnectionLost,
    /// A line is larger than the whole controller buffer
    LineTooLong {
        /// Sequence index of the oversized line
        index: usize,
    },
}

impl PauseReason {
    /// Check whether this pause was requested by the operator
    pub fn is_user(&self) -> bool {
        matches!(self, PauseReason::User)
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::User => write!(f, "paused by user"),
            PauseReason::Alarm(alarm) => write!(f, "alarm: {}", alarm),
            PauseReason::TransportError(reason) => write!(f, "transport error: {}", reason),
            PauseReason::FatalLineError { index, code } => {
                write!(f, "fatal error:{} on line {}", code, index)
            }
            PauseReason::RetriesExhausted { index } => {
                write!(f, "line {} not acknowledged, retries exhausted", index)
            }
            PauseReason::ConnectionLost => write!(f, "connection lost"),
            PauseReason::LineTooLong { index } => {
                write!(f, "line {} does not fit the controller buffer", index)
            }
        }
    }
}

/// Progress counters emitted after every send and acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamProgress {
    /// Job lines handed to the transport
    pub sent: usize,
    /// Job lines acknowledged (`ok` or `error:`)
    pub acknowledged: usize,
    /// Job lines loaded
    pub total: usize,
    /// Bytes currently occupied in the controller RX buffer
    pub buffer_used: usize,
}

impl StreamProgress {
    /// Fraction of acknowledged lines in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.acknowledged as f64 / self.total as f64
    }
}

/// Snapshot returned by `status()`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamStatus {
    /// Session state
    pub state: SessionState,
    /// Dry-run mode active
    pub check_mode: bool,
    /// Job lines handed to the transport
    pub sent: usize,
    /// Job lines acknowledged
    pub acknowledged: usize,
    /// Job lines loaded
    pub total: usize,
    /// Bytes currently occupied in the controller RX buffer
    pub buffer_used: usize,
    /// Controller RX buffer capacity
    pub buffer_capacity: usize,
    /// Oldest unacknowledged job line, if any
    pub current_line: Option<String>,
    /// Sequence index of the last acknowledged line
    pub last_acknowledged: Option<usize>,
}

/// A line the controller rejected, or a line that failed terminally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    /// Sequence index of the line
    pub index: usize,
    /// The line text as sent
    pub text: String,
    /// Controller error code, `None` for engine-detected failures
    pub code: Option<u16>,
    /// Human readable description
    pub message: String,
    /// Whether this error halted the session
    pub fatal: bool,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(
                f,
                "line {} '{}': error:{} - {}",
                self.index, self.text, code, self.message
            ),
            None => write!(f, "line {} '{}': {}", self.index, self.text, self.message),
        }
    }
}

/// Outcome of a soft-reset recovery, reported before sending resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Sequence index the send cursor was rewound to
    pub resume_from: usize,
    /// Number of job lines returned to the pending queue
    pub requeued: usize,
    /// Buffer usage right after the reset
    pub buffer_used: usize,
}
