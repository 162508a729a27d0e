//! # GCodeStream Core
//!
//! Core types, errors, and observer interfaces for GCodeStream.
//! Provides the session state model, status snapshots, and the observer
//! contract through which the streaming engine reports progress.

pub mod core;
pub mod data;
pub mod error;

pub use crate::core::{EventDispatcher, ObserverHandle, ObserverSet, StreamEvent, StreamObserver};

pub use data::{
    BufferReport, LineError, PauseReason, Position, RecoveryReport, SessionState,
    StatusSnapshot, StreamProgress, StreamStatus,
};

pub use error::{ConnectionError, Error, Result, StreamError};
