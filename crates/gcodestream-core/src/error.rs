//! Error handling for GCodeStream
//!
//! Provides error types for the layers of the streamer:
//! - Stream errors (session state machine, flow control, timeouts, alarms)
//! - Connection errors (port enumeration, opening, I/O)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Streaming session error type
///
/// Represents failures of the streaming protocol engine, both the ones
/// returned synchronously from session operations and the ones delivered
/// asynchronously through `StreamObserver::on_error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// A session is already sending or paused
    #[error("A streaming session is already active")]
    AlreadyStreaming,

    /// No commands are loaded
    #[error("No commands to send")]
    EmptyQueue,

    /// The transport is not connected
    #[error("Transport not connected")]
    NotConnected,

    /// The transport failed to deliver a line or control signal
    #[error("Transport error: {reason}")]
    Transport {
        /// The reason reported by the transport.
        reason: String,
    },

    /// A command was never acknowledged within the retry bound
    #[error("Line {index} not acknowledged after {retries} retries")]
    Timeout {
        /// Sequence index of the stalled command.
        index: usize,
        /// Number of retries attempted.
        retries: u32,
    },

    /// The controller entered an alarm state
    #[error("Alarm: {code:?} - {message}")]
    Alarm {
        /// The alarm code, if the controller reported a numeric one.
        code: Option<u16>,
        /// The alarm description.
        message: String,
    },

    /// The transport reported it is no longer connected
    #[error("Connection lost")]
    ConnectionLost,

    /// A single command does not fit even into an empty controller buffer
    #[error("Line {index} is {length} bytes, larger than the {capacity} byte buffer")]
    LineTooLong {
        /// Sequence index of the oversized command.
        index: usize,
        /// Byte length including the terminator.
        length: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// The engine task is no longer running
    #[error("Streaming engine has stopped")]
    EngineStopped,
}

/// Connection error type
///
/// Represents errors related to opening and using a concrete transport.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Port enumeration failed
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason enumeration failed.
        reason: String,
    },

    /// I/O error on an open port
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for GCodeStream
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Streaming error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Stream(StreamError::NotConnected)
                | Error::Stream(StreamError::ConnectionLost)
        )
    }

    /// Convert into a stream error suitable for observer notification
    pub fn into_stream_error(self) -> StreamError {
        match self {
            Error::Stream(e) => e,
            other => StreamError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout: Error = StreamError::Timeout {
            index: 4,
            retries: 3,
        }
        .into();
        assert!(!timeout.is_connection_error());

        let lost: Error = StreamError::ConnectionLost.into();
        assert!(lost.is_connection_error());

        let open: Error = ConnectionError::FailedToOpen {
            port: "/dev/ttyUSB9".into(),
            reason: "busy".into(),
        }
        .into();
        assert!(open.is_connection_error());
    }

    #[test]
    fn test_into_stream_error() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        match io.into_stream_error() {
            StreamError::Transport { reason } => assert!(reason.contains("pipe")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        let e = StreamError::LineTooLong {
            index: 2,
            length: 200,
            capacity: 127,
        };
        assert_eq!(
            e.to_string(),
            "Line 2 is 200 bytes, larger than the 127 byte buffer"
        );
    }
}
