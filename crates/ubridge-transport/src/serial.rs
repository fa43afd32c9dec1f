//! Serial port access and bridge discovery.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LineStream;
use crate::traits::ReadTimeout;

/// USB vendor id of the micro:bit DAPLink interface.
pub const MICROBIT_VID: u16 = 0x0D28;
/// USB product id of the micro:bit DAPLink interface.
pub const MICROBIT_PID: u16 = 0x0204;
/// Baud rate the bridge firmware configures.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial link settings. Framing is fixed at 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Initial read timeout. Line reads override it per call.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Settings for `path` with the bridge defaults.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(500),
        }
    }
}

/// An open serial port.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Name of the underlying device, if the driver reports one.
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl ReadTimeout for SerialLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.port
            .set_timeout(timeout.max(Duration::from_millis(1)))
            .map_err(std::io::Error::from)
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.port.name())
            .finish()
    }
}

/// Open a serial port and wrap it in a line stream.
pub fn open_serial(config: &SerialConfig) -> Result<LineStream<SerialLink>> {
    let port = serialport::new(config.path.as_str(), config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.read_timeout)
        .open()
        .map_err(|err| TransportError::Open {
            path: config.path.clone(),
            source: err.into(),
        })?;

    info!(path = %config.path, baud = config.baud_rate, "serial port open");
    Ok(LineStream::new(SerialLink { port }))
}

/// A serial port visible to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    /// USB vendor/product id, for USB ports only.
    pub usb_id: Option<(u16, u16)>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Whether this port is a micro:bit DAPLink interface.
    pub fn is_microbit(&self) -> bool {
        self.matches(MICROBIT_VID, MICROBIT_PID)
    }

    /// Whether this port belongs to the given USB device.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.usb_id == Some((vid, pid))
    }
}

/// Enumerate the serial ports on this host.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|err| TransportError::Io(err.into()))?;
    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb) => PortInfo {
                path: port.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => PortInfo {
                path: port.port_name,
                usb_id: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        })
        .collect())
}

/// Find the first port belonging to the given USB device.
pub fn find_port(vid: u16, pid: u16) -> Result<String> {
    let ports = list_ports()?;
    debug!(count = ports.len(), "enumerated serial ports");
    select_port(&ports, vid, pid)
        .map(|port| port.path.clone())
        .ok_or(TransportError::NotFound { vid, pid })
}

fn select_port(ports: &[PortInfo], vid: u16, pid: u16) -> Option<&PortInfo> {
    ports.iter().find(|port| port.matches(vid, pid))
}
