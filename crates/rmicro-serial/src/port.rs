//! Serial port enumeration and resolution

use crate::error::{Result, SerialError};
use regex::RegexBuilder;
use serialport::SerialPortType;

/// An enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path, e.g. `/dev/ttyACM0`
    pub device: String,
    /// Human readable description, usually the USB product string
    pub description: Option<String>,
    /// Hardware id, e.g. `USB VID:PID=0483:374B SER=0672FF48`
    pub hwid: Option<String>,
}

impl PortInfo {
    fn search_fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.device.as_str())
            .chain(self.description.as_deref())
            .chain(self.hwid.as_deref())
    }
}

/// Source of serial port listings
pub trait PortLister: Send {
    /// List the ports currently visible
    fn list_ports(&self) -> Result<Vec<PortInfo>>;
}

/// Lists the ports the operating system reports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortLister;

impl PortLister for SystemPortLister {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(SerialError::EnumerationFailed)?;
        Ok(ports
            .into_iter()
            .map(|port| {
                let (description, hwid) = match port.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
                        if let Some(serial) = &usb.serial_number {
                            hwid.push_str(&format!(" SER={}", serial));
                        }
                        (usb.product.or(usb.manufacturer), Some(hwid))
                    }
                    SerialPortType::PciPort => (None, Some("PCI".to_string())),
                    SerialPortType::BluetoothPort => (None, Some("BLUETOOTH".to_string())),
                    SerialPortType::Unknown => (None, None),
                };
                PortInfo {
                    device: port.port_name,
                    description,
                    hwid,
                }
            })
            .collect())
    }
}

/// How a serial transport picks its device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// Use this device path as is
    Device(String),
    /// Search enumerated ports with a case-insensitive regex
    Grep(String),
}

/// Ports whose device, description or hardware id match `pattern`
pub fn grep_ports(pattern: &str, lister: &dyn PortLister) -> Result<Vec<PortInfo>> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| SerialError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

    Ok(lister
        .list_ports()?
        .into_iter()
        .filter(|port| port.search_fields().any(|field| re.is_match(field)))
        .collect())
}

/// Resolve `selector` to a single device path
///
/// A pattern must match exactly one port.
pub fn resolve_port(selector: &PortSelector, lister: &dyn PortLister) -> Result<String> {
    let pattern = match selector {
        PortSelector::Device(device) => return Ok(device.clone()),
        PortSelector::Grep(pattern) => pattern,
    };

    let mut ports = grep_ports(pattern, lister)?;
    match ports.len() {
        0 => Err(SerialError::NotFound {
            pattern: pattern.clone(),
            candidates: 0,
        }),
        1 => {
            let port = ports.remove(0);
            log::debug!("'{}' resolved to {}", pattern, port.device);
            Ok(port.device)
        }
        _ => Err(SerialError::Ambiguous {
            pattern: pattern.clone(),
            candidates: ports.into_iter().map(|port| port.device).collect(),
        }),
    }
}
