//! G-code streaming engine
//!
//! Feeds a queue of sanitized lines to a controller while keeping its
//! serial receive buffer full but never overflowing it (character-counting
//! flow control), matches `ok`/`error:` replies to outstanding lines in
//! FIFO order, and recovers from lost acknowledgments by probing, then
//! soft-resetting and replaying the unacknowledged tail.
//!
//! [`StreamSession`] is the state machine; it never waits on its own.
//! [`StreamingEngine`] runs one session on a tokio task and serializes
//! control requests, inbound lines, and the armed deadline into it.

pub mod buffer;
pub mod engine;
pub mod queue;
pub mod retry;
pub mod session;

pub use buffer::BufferAccountant;
pub use engine::{StreamerHandle, StreamingEngine};
pub use queue::{sanitize_line, Command, CommandQueue};
pub use retry::{TimeoutController, TimerKind};
pub use session::StreamSession;

use crate::firmware::grbl::{CHECK_MODE_TOGGLE, DEFAULT_RX_BUFFER_SIZE};
use std::collections::BTreeSet;
use std::time::Duration;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Controller RX buffer size in bytes
    pub buffer_capacity: usize,
    /// Optional cap on outstanding lines regardless of bytes
    pub max_in_flight: Option<usize>,
    /// How long the oldest outstanding line may wait for its reply
    pub ack_timeout: Duration,
    /// How long to wait after a status probe before resetting
    pub probe_timeout: Duration,
    /// Pause after a soft reset before replaying
    pub settle_interval: Duration,
    /// Timeouts a single line may suffer before the session fails
    pub max_retries: u32,
    /// Extra attempts for a failed transport send
    pub transport_retries: u32,
    /// Delay between transport send attempts
    pub transport_retry_delay: Duration,
    /// `error:N` codes that pause the session instead of continuing
    pub fatal_error_codes: BTreeSet<u16>,
    /// Line that toggles dry-run mode
    pub check_mode_command: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_RX_BUFFER_SIZE,
            max_in_flight: None,
            ack_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            settle_interval: Duration::from_secs(1),
            max_retries: 3,
            transport_retries: 2,
            transport_retry_delay: Duration::from_millis(100),
            fatal_error_codes: BTreeSet::new(),
            check_mode_command: CHECK_MODE_TOGGLE.to_string(),
        }
    }
}
