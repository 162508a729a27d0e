//! Serial port transport
//!
//! Provides a [`Transport`] over a USB or RS-232 serial connection to a
//! GRBL-class controller.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Baud rate, read timeout, and hardware flow control configuration
//! - A background reader thread that assembles inbound lines
//! - Out-of-band real-time control bytes

use super::lines::{LineAssembler, LineFanout, LineSubscription, SubscriptionId};
use super::Transport;
use async_trait::async_trait;
use gcodestream_core::{ConnectionError, Result, StreamError};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.port_name, self.description)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        Ok(())
    }
}

/// List serial ports that look like CNC controllers
///
/// Filters to:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*, and the /dev/ttyGRBL simulator link
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::Enumeration {
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo::new(&port.port_name, port_description(port));
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                info.manufacturer = usb.manufacturer.clone();
                info.serial_number = usb.serial_number.clone();
            }
            info
        })
        .collect())
}

fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name == "/dev/ttyGRBL"
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Parameters for opening a serial transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialParams {
    /// Port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout for the reader thread's polling loop
    pub read_timeout_ms: u64,
    /// Use RTS/CTS hardware flow control
    pub hardware_flow_control: bool,
}

impl SerialParams {
    /// Parameters for `port` at `baud_rate` with default polling
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            read_timeout_ms: 20,
            hardware_flow_control: false,
        }
    }
}

/// Serial connection to a controller
pub struct SerialTransport {
    port_name: String,
    writer: Box<dyn serialport::SerialPort>,
    fanout: Arc<LineFanout>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open the port and start the reader thread
    pub fn open(params: &SerialParams) -> Result<Self> {
        if params.port.is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "no port specified".to_string(),
            }
            .into());
        }
        if params.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            }
            .into());
        }

        let writer = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.read_timeout_ms.max(1)))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(if params.hardware_flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                open_error(&params.port, e)
            })?;

        let reader_port = writer
            .try_clone()
            .map_err(|e| open_error(&params.port, e))?;

        let fanout = Arc::new(LineFanout::new());
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader = std::thread::Builder::new()
            .name(format!("serial-reader {}", params.port))
            .spawn({
                let fanout = fanout.clone();
                let connected = connected.clone();
                let shutdown = shutdown.clone();
                move || read_loop(reader_port, fanout, connected, shutdown)
            })
            .map_err(|e| open_error(&params.port, e))?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);

        Ok(Self {
            port_name: params.port.clone(),
            writer,
            fanout,
            connected,
            shutdown,
            reader: Some(reader),
        })
    }

    /// Name of the open port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(StreamError::NotConnected.into());
        }

        self.writer
            .write_all(data)
            .and_then(|_| self.writer.flush())
            .map_err(|e| {
                tracing::error!("Write to {} failed: {}", self.port_name, e);
                ConnectionError::IoError {
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

fn open_error(port: &str, e: impl std::fmt::Display) -> gcodestream_core::Error {
    ConnectionError::FailedToOpen {
        port: port.to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    fanout: Arc<LineFanout>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 256];

    while !shutdown.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for line in assembler.push(&buf[..n]) {
                    tracing::trace!("< {}", line);
                    fanout.publish(&line);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                tracing::warn!("Serial read failed, closing connection: {}", e);
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }
    }

    fanout.close();
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        tracing::trace!("> {}", line);
        self.write_bytes(&data)
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| {
                ConnectionError::IoError {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn send_realtime(&mut self, byte: u8) -> Result<()> {
        tracing::trace!("> 0x{:02x}", byte);
        self.write_bytes(&[byte])
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&mut self) -> LineSubscription {
        self.fanout.subscribe()
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.fanout.unsubscribe(id);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        tracing::debug!("Closed {}", self.port_name);
    }
}
