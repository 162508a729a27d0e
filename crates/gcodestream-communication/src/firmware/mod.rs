//! Firmware protocol support
//!
//! Only the GRBL dialect is needed: FluidNC speaks the same streaming
//! protocol.

pub mod grbl;
