//! Configuration file for the streamer
//!
//! Two sections:
//! - `[connection]`: serial port, baud rate, read timeout
//! - `[streaming]`: flow control, timeouts and retry bounds of the engine
//!
//! Files are TOML or JSON, chosen by extension. Every field has a default,
//! so a partial file only overrides what it names.

use crate::error::{ConfigError, Result, SettingsError};
use gcodestream_communication::{SerialParams, StreamConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> std::result::Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name; none means it must come from the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout of the serial reader in milliseconds
    pub timeout_ms: u64,
    /// RTS/CTS hardware flow control
    pub hardware_flow_control: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let serial = SerialParams::default();
        Self {
            port: None,
            baud_rate: serial.baud_rate,
            timeout_ms: serial.read_timeout_ms,
            hardware_flow_control: serial.hardware_flow_control,
        }
    }
}

impl ConnectionSettings {
    /// Serial parameters for `port`, or for the configured port if `None`
    pub fn serial_params(&self, port: Option<&str>) -> Option<SerialParams> {
        let port = port.or(self.port.as_deref())?;
        Some(SerialParams {
            port: port.to_string(),
            baud_rate: self.baud_rate,
            read_timeout_ms: self.timeout_ms,
            hardware_flow_control: self.hardware_flow_control,
        })
    }
}

/// Streaming engine settings, durations in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Controller RX buffer size in bytes
    pub buffer_capacity: usize,
    /// Cap on unacknowledged lines; none means bytes alone limit sending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
    /// Wait for the oldest line's `ok` before probing with `?`
    pub ack_timeout_ms: u64,
    /// Wait for any answer to the probe before a soft reset
    pub probe_timeout_ms: u64,
    /// Pause after a soft reset before replaying
    pub settle_interval_ms: u64,
    /// Timeouts one line may suffer before the run fails
    pub max_retries: u32,
    /// Extra attempts for a failed write
    pub transport_retries: u32,
    /// Delay between write attempts
    pub transport_retry_delay_ms: u64,
    /// `error:<code>` values that pause the run
    pub fatal_error_codes: Vec<u16>,
    /// Command toggling the controller's dry-run mode
    pub check_mode_command: String,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for StreamingSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            max_in_flight: config.max_in_flight,
            ack_timeout_ms: millis(config.ack_timeout),
            probe_timeout_ms: millis(config.probe_timeout),
            settle_interval_ms: millis(config.settle_interval),
            max_retries: config.max_retries,
            transport_retries: config.transport_retries,
            transport_retry_delay_ms: millis(config.transport_retry_delay),
            fatal_error_codes: config.fatal_error_codes.iter().copied().collect(),
            check_mode_command: config.check_mode_command.clone(),
        }
    }
}

impl StreamingSettings {
    /// Engine configuration described by these settings
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            buffer_capacity: self.buffer_capacity,
            max_in_flight: self.max_in_flight,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            settle_interval: Duration::from_millis(self.settle_interval_ms),
            max_retries: self.max_retries,
            transport_retries: self.transport_retries,
            transport_retry_delay: Duration::from_millis(self.transport_retry_delay_ms),
            fatal_error_codes: self.fatal_error_codes.iter().copied().collect::<BTreeSet<_>>(),
            check_mode_command: self.check_mode_command.clone(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Complete streamer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial connection settings
    pub connection: ConnectionSettings,
    /// Streaming engine settings
    pub streaming: StreamingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `<platform config dir>/gcodestream/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDirectory)?;
        Ok(dir.join("gcodestream").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Load {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = match format {
            Format::Toml => toml::from_str(&content)?,
            Format::Json => serde_json::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!(
                "No configuration at {}, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let format = Format::from_path(path)?;

        let content = match format {
            Format::Toml => toml::to_string_pretty(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
        };

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
        };
        write().map_err(|source| SettingsError::Save {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.connection.baud_rate == 0 {
            return Err(ConfigError::out_of_range("connection.baud_rate", 0));
        }
        if self.connection.timeout_ms == 0 {
            return Err(ConfigError::out_of_range("connection.timeout_ms", 0));
        }

        let streaming = &self.streaming;
        if streaming.buffer_capacity == 0 {
            return Err(ConfigError::out_of_range("streaming.buffer_capacity", 0));
        }
        if streaming.max_in_flight == Some(0) {
            return Err(ConfigError::out_of_range("streaming.max_in_flight", 0));
        }
        if streaming.ack_timeout_ms == 0 {
            return Err(ConfigError::out_of_range("streaming.ack_timeout_ms", 0));
        }
        if streaming.probe_timeout_ms == 0 {
            return Err(ConfigError::out_of_range("streaming.probe_timeout_ms", 0));
        }
        if streaming.check_mode_command.trim().is_empty() {
            return Err(ConfigError::out_of_range(
                "streaming.check_mode_command",
                "\"\"",
            ));
        }

        Ok(())
    }
}
