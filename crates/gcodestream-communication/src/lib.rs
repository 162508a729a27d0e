//! # GCodeStream Communication
//!
//! Transport contract, serial port transport, GRBL protocol vocabulary, and
//! the flow-controlled streaming engine that drives a job through them.

pub mod communication;
pub mod firmware;
pub mod streaming;

pub use communication::{
    list_ports, LineAssembler, LineFanout, LineSubscription, SerialParams, SerialPortInfo,
    SerialTransport, SubscriptionId, Transport,
};

pub use firmware::grbl::{GrblResponse, StatusParser};

pub use streaming::{
    sanitize_line, BufferAccountant, Command, CommandQueue, StreamConfig, StreamSession,
    StreamerHandle, StreamingEngine, TimeoutController, TimerKind,
};
