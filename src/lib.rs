//! # GCodeStream
//!
//! A flow-controlled G-code streamer for GRBL and FluidNC controllers.
//!
//! ## Architecture
//!
//! GCodeStream is organized as a workspace with multiple crates:
//!
//! 1. **gcodestream-core** - Errors, session records, observer interface, events
//! 2. **gcodestream-communication** - Transports, GRBL responses, streaming engine
//! 3. **gcodestream-settings** - Configuration file handling
//! 4. **gcodestream** - Command-line streamer that integrates all crates
//!
//! The engine keeps the controller's serial receive buffer full without
//! overflowing it: every line's byte cost is reserved when it is sent and
//! released when the controller answers `ok` or `error:`. Stalls are probed
//! with a status query and, if the controller stays silent, recovered with a
//! soft reset and a rewind to the oldest unacknowledged line.

pub mod cli;
pub mod runner;

pub use cli::Cli;
pub use runner::stream_job;

pub use gcodestream_core::{
    Error, EventDispatcher, LineError, ObserverHandle, PauseReason, RecoveryReport, Result,
    SessionState, StatusSnapshot, StreamError, StreamEvent, StreamObserver, StreamProgress,
    StreamStatus,
};

pub use gcodestream_communication::{
    list_ports, GrblResponse, SerialParams, SerialPortInfo, SerialTransport, StreamConfig,
    StreamSession, StreamerHandle, StreamingEngine, Transport,
};

pub use gcodestream_settings::{Config, ConnectionSettings, StreamingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Initialize logging with one JSON object per event, for log collectors
pub fn init_json_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
}
