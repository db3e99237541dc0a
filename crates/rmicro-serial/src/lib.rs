//! rmicro-serial - Serial port transport
//!
//! Talks to a board over a serial port picked either by device path or
//! by a regex searched over the enumerated ports' device, description
//! and hardware id.
//!
//! ```ignore
//! use rmicro_serial::{SerialConfig, SerialTransport};
//!
//! let config = SerialConfig::grep("VID:PID=0483:374B");
//! let mut transport = SerialTransport::new(config);
//! transport.open()?;
//! ```
//!
//! # End of stream
//!
//! A read blocks until the first byte arrives. After that it keeps
//! reading until the request is satisfied or one read timeout interval
//! passes with no data, which counts as end of stream.

pub mod error;
mod port;
mod registry;

pub use error::{Result, SerialError};
pub use port::{grep_ports, resolve_port, PortInfo, PortLister, PortSelector, SystemPortLister};
pub use registry::{install_exit_hook, PortId, PortRegistry};

use registry::PortSlot;
use rmicro_core::transport::{write_accepted, Transport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

/// Default baud rate
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout, also the idle interval that ends a read
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Which device to open
    pub selector: PortSelector,
    /// Baud rate
    pub baud: u32,
    /// Read timeout
    pub timeout: Duration,
    /// Take an exclusive lock on the device (unix only)
    pub exclusive: bool,
    /// Write at most this many bytes per call to the driver
    pub write_chunk: Option<usize>,
}

impl SerialConfig {
    /// Configuration for an explicit device path
    pub fn device(device: impl Into<String>) -> Self {
        Self::with_selector(PortSelector::Device(device.into()))
    }

    /// Configuration for the single port matching `pattern`
    pub fn grep(pattern: impl Into<String>) -> Self {
        Self::with_selector(PortSelector::Grep(pattern.into()))
    }

    fn with_selector(selector: PortSelector) -> Self {
        Self {
            selector,
            baud: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
            exclusive: true,
            write_chunk: None,
        }
    }
}

struct OpenPort {
    id: PortId,
    device: String,
    slot: PortSlot,
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    lister: Box<dyn PortLister>,
    registry: Arc<PortRegistry>,
    port: Option<OpenPort>,
}

impl SerialTransport {
    /// Create a transport using the system port list and global registry
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            lister: Box::new(SystemPortLister),
            registry: PortRegistry::global(),
            port: None,
        }
    }

    /// Use `registry` instead of the global one
    pub fn with_registry(mut self, registry: Arc<PortRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use `lister` to enumerate ports
    pub fn with_lister(mut self, lister: impl PortLister + 'static) -> Self {
        self.lister = Box::new(lister);
        self
    }

    /// Configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Device path of the open port
    pub fn device(&self) -> Option<&str> {
        self.port.as_ref().map(|port| port.device.as_str())
    }

    fn open_device(&self, device: &str) -> Result<Box<dyn SerialPort>> {
        let port_err = |source| SerialError::Port {
            device: device.to_string(),
            source,
        };

        let builder = serialport::new(device, self.config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.timeout);

        #[cfg(unix)]
        let port: Box<dyn SerialPort> = {
            let mut port = builder.open_native().map_err(port_err)?;
            port.set_exclusive(self.config.exclusive).map_err(port_err)?;
            Box::new(port)
        };
        #[cfg(not(unix))]
        let port = builder.open().map_err(port_err)?;

        port.clear(ClearBuffer::All).map_err(port_err)?;
        Ok(port)
    }

    /// Lock the open port, or fail if there is none
    fn slot(&self) -> rmicro_core::Result<(&str, MutexGuard<'_, Option<Box<dyn SerialPort>>>)> {
        let open = self
            .port
            .as_ref()
            .ok_or_else(|| rmicro_core::Error::NotOpen("serial port".into()))?;
        let guard = open
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok((open.device.as_str(), guard))
    }

    /// One driver read into `buf`; `Ok(0)` on timeout
    fn read_once(&self, buf: &mut [u8]) -> rmicro_core::Result<usize> {
        let (device, mut guard) = self.slot()?;
        let port = guard
            .as_mut()
            .ok_or_else(|| rmicro_core::Error::NotOpen(device.to_string()))?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(rmicro_core::Error::path_io(device, e)),
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> rmicro_core::Result<()> {
        if let Some(port) = &self.port {
            return Err(rmicro_core::Error::AlreadyOpen(port.device.clone()));
        }

        let device = resolve_port(&self.config.selector, self.lister.as_ref())?;
        let port = self.open_device(&device)?;
        let slot: PortSlot = Arc::new(std::sync::Mutex::new(Some(port)));
        let id = self.registry.add(&device, Arc::clone(&slot));

        log::info!("Opened serial port {} at {} baud", device, self.config.baud);
        self.port = Some(OpenPort { id, device, slot });
        Ok(())
    }

    fn close(&mut self) -> rmicro_core::Result<()> {
        let Some(open) = self.port.take() else {
            return Ok(());
        };

        self.registry.remove(open.id);
        let port = open
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut port) = port {
            if let Err(e) = port.flush() {
                log::warn!("{}: flush on close failed: {}", open.device, e);
            }
        }

        log::debug!("{}: closed", open.device);
        Ok(())
    }

    fn read(&mut self, n: usize) -> rmicro_core::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        if n == 0 {
            return Ok(buf);
        }

        let mut filled = 0;
        while filled == 0 {
            filled = self.read_once(&mut buf)?;
        }

        while filled < n {
            let count = self.read_once(&mut buf[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }

        buf.truncate(filled);
        Ok(buf)
    }

    fn write(&mut self, data: &[u8]) -> rmicro_core::Result<usize> {
        let chunk = self.config.write_chunk.unwrap_or(data.len()).max(1);
        let (device, mut guard) = self.slot()?;
        let port = guard
            .as_mut()
            .ok_or_else(|| rmicro_core::Error::NotOpen(device.to_string()))?;

        let mut accepted = 0;
        for piece in data.chunks(chunk) {
            let written = match write_accepted(port, piece, device) {
                Ok(written) => written,
                Err(e) if accepted == 0 => return Err(e),
                Err(e) => {
                    log::debug!("{}: write stopped after {} bytes: {}", device, accepted, e);
                    break;
                }
            };
            accepted += written;
            if written < piece.len() {
                break;
            }
        }
        Ok(accepted)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing serial port: {}", e);
        }
    }
}
