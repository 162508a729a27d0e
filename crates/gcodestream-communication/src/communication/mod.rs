//! Transport layer
//!
//! Defines the contract the streaming engine consumes from a byte-oriented
//! controller connection, plus the inbound-line plumbing and a serial port
//! implementation.
//!
//! Inbound data reaches the engine through a typed per-session
//! [`LineSubscription`] rather than a process-wide broadcast, so two sessions
//! can never observe each other's traffic.

pub mod lines;
pub mod serial;

pub use lines::{LineAssembler, LineFanout, LineSubscription, SubscriptionId};
pub use serial::{list_ports, SerialParams, SerialPortInfo, SerialTransport};

use crate::firmware::grbl::realtime;
use async_trait::async_trait;
use gcodestream_core::Result;

/// Byte-oriented connection to a motion controller
///
/// `send` and `flush` may suspend; the single-byte control signals are
/// written out of band and never wait for the controller.
#[async_trait]
pub trait Transport: Send {
    /// Write one command line; the transport appends the terminator
    async fn send(&mut self, line: &str) -> Result<()>;

    /// Discard any input pending on the connection
    async fn flush(&mut self) -> Result<()>;

    /// Write a single real-time control byte
    fn send_realtime(&mut self, byte: u8) -> Result<()>;

    /// Whether the underlying connection is still open
    fn is_connected(&self) -> bool;

    /// Subscribe to inbound text lines
    fn subscribe(&mut self) -> LineSubscription;

    /// Drop a subscription created by [`Transport::subscribe`]
    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Pause motion (`!`)
    fn feed_hold(&mut self) -> Result<()> {
        self.send_realtime(realtime::FEED_HOLD)
    }

    /// Resume motion after a hold (`~`)
    fn resume_from_hold(&mut self) -> Result<()> {
        self.send_realtime(realtime::CYCLE_START)
    }

    /// Clear the controller's pending command buffer (Ctrl-X)
    fn soft_reset(&mut self) -> Result<()> {
        self.send_realtime(realtime::SOFT_RESET)
    }

    /// Ask for an immediate status report (`?`)
    fn request_status(&mut self) -> Result<()> {
        self.send_realtime(realtime::STATUS_QUERY)
    }
}
