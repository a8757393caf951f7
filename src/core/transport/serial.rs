//! Serial port configuration, opening and discovery

use super::channel::POLL_INTERVAL;
use super::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use crate::core::error::{Result, RobotError};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Soft timeout for delimiter and line reads
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Create a new serial configuration with the default read timeout
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }

    /// Set the read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Human readable connection summary
    pub fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud (8N1, read timeout {} ms)",
            self.port,
            self.baud_rate,
            self.read_timeout.as_millis()
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("COM1", DEFAULT_BAUD_RATE)
    }
}

/// Open the port described by `config` with a short per-read poll timeout
pub(crate) fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let poll = config.read_timeout.min(POLL_INTERVAL);

    serialport::new(&config.port, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .timeout(poll)
        .open()
        .map_err(|source| RobotError::Connection {
            port: config.port.clone(),
            source,
        })
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    serialport::available_ports().map_err(|e| RobotError::Io(e.into()))
}

/// Text used to match a port against a device description
///
/// USB ports are described by their product and manufacturer strings; other
/// port types have no description.
pub fn port_description(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => [usb.product.as_deref(), usb.manufacturer.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort | SerialPortType::Unknown => String::new(),
    }
}

/// First port whose description contains `description`
pub fn find_port<'a>(ports: &'a [SerialPortInfo], description: &str) -> Option<&'a SerialPortInfo> {
    ports
        .iter()
        .find(|info| port_description(info).contains(description))
}

/// Find the port of the device whose description contains `description`
pub fn discover(description: &str) -> Result<String> {
    select_port(&list_ports()?, description)
}

/// Name of the first port in `ports` matching `description`
pub fn select_port(ports: &[SerialPortInfo], description: &str) -> Result<String> {
    let info = find_port(ports, description)
        .ok_or_else(|| RobotError::DeviceNotFound(description.to_string()))?;

    tracing::info!(
        "Found \"{}\" on {} ({})",
        description,
        info.port_name,
        port_description(info)
    );
    Ok(info.port_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, product: &str, manufacturer: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x1a86,
                pid: 0x7523,
                serial_number: None,
                manufacturer: manufacturer.map(str::to_string),
                product: Some(product.to_string()),
            }),
        }
    }

    #[test]
    fn test_find_port_by_description() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
            usb("/dev/ttyACM0", "USB Serial Device", None),
            usb("/dev/ttyUSB0", "USB-SERIAL CH340", Some("wch.cn")),
        ];

        let found = find_port(&ports, "CH340").unwrap();
        assert_eq!(found.port_name, "/dev/ttyUSB0");

        let lock = find_port(&ports, "USB Serial Device").unwrap();
        assert_eq!(lock.port_name, "/dev/ttyACM0");

        assert!(find_port(&ports, "FT232").is_none());
    }

    #[test]
    fn test_select_port() {
        let ports = vec![usb("/dev/ttyUSB1", "USB-SERIAL CH340", Some("wch.cn"))];
        assert_eq!(select_port(&ports, "CH340").unwrap(), "/dev/ttyUSB1");

        match select_port(&[], "CH340") {
            Err(RobotError::DeviceNotFound(description)) => assert_eq!(description, "CH340"),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
        assert!(matches!(
            select_port(&ports, "FT232"),
            Err(RobotError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let config = SerialConfig::new("/dev/cardbot-nope", 115_200);
        match open_port(&config) {
            Err(RobotError::Connection { port, .. }) => assert_eq!(port, "/dev/cardbot-nope"),
            Err(other) => panic!("expected Connection, got {other:?}"),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[test]
    fn test_port_description() {
        let info = usb("COM3", "USB-SERIAL CH340", Some("wch.cn"));
        assert_eq!(port_description(&info), "USB-SERIAL CH340 wch.cn");
    }

    #[test]
    fn test_connection_info() {
        let config = SerialConfig::new("/dev/ttyUSB0", 115_200);
        assert_eq!(
            config.connection_info(),
            "/dev/ttyUSB0 @ 115200 baud (8N1, read timeout 1000 ms)"
        );
    }
}
