//! GRBL protocol vocabulary
//!
//! GRBL and FluidNC share the line-oriented `ok` / `error:N` / `ALARM:N`
//! acknowledgment protocol, `<...>` status reports, and single-byte real-time
//! commands.

pub mod error_decoder;
pub mod response_parser;
pub mod status_parser;

pub use error_decoder::{decode_alarm, decode_error};
pub use response_parser::GrblResponse;
pub use status_parser::StatusParser;

/// Real-time command bytes, processed by the controller immediately and
/// never placed in the RX buffer
pub mod realtime {
    /// Request a status report
    pub const STATUS_QUERY: u8 = b'?';
    /// Feed hold
    pub const FEED_HOLD: u8 = b'!';
    /// Cycle start / resume
    pub const CYCLE_START: u8 = b'~';
    /// Soft reset (Ctrl-X)
    pub const SOFT_RESET: u8 = 0x18;
}

/// Toggles check (dry-run) mode on GRBL
pub const CHECK_MODE_TOGGLE: &str = "$C";

/// GRBL's serial RX buffer is 128 bytes; one byte is kept free
pub const DEFAULT_RX_BUFFER_SIZE: usize = 127;
