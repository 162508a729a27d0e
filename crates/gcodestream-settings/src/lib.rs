//! GCodeStream Settings Crate
//!
//! Loads, validates and saves the streamer's configuration file and turns
//! it into the parameters the serial transport and streaming engine take.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, StreamingSettings};
pub use error::{ConfigError, Result, SettingsError};
