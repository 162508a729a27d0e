//! Command-line interface

use anyhow::Context;
use clap::Parser;
use gcodestream_settings::Config;
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

/// Stream a G-code file to a GRBL or FluidNC controller
#[derive(Debug, Clone, Parser)]
#[command(name = "gcodestream", version, long_version = LONG_VERSION)]
pub struct Cli {
    /// G-code file to stream
    #[arg(required_unless_present = "list_ports")]
    pub file: Option<PathBuf>,

    /// Serial port, overrides `connection.port`
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate, overrides `connection.baud_rate`
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Controller RX buffer size in bytes, overrides `streaming.buffer_capacity`
    #[arg(long, value_name = "BYTES")]
    pub buffer_size: Option<usize>,

    /// Dry run: wrap the job in the controller's check mode
    #[arg(long)]
    pub check: bool,

    /// Configuration file (.toml or .json)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List candidate serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Log JSON lines instead of pretty text
    #[arg(long)]
    pub json_log: bool,
}

impl Cli {
    /// Configuration from `--config` (or the platform default file) with
    /// command-line overrides applied
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => match Config::default_path() {
                Ok(path) => Config::load_or_default(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                Err(e) => {
                    tracing::debug!("{}; using default configuration", e);
                    Config::default()
                }
            },
        };

        if let Some(port) = &self.port {
            config.connection.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.connection.baud_rate = baud;
        }
        if let Some(bytes) = self.buffer_size {
            config.streaming.buffer_capacity = bytes;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}
