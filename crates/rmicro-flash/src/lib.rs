//! rmicro-flash - Transport registry and flashers
//!
//! Maps transport spec strings such as `serial:grep=STLink,baud=115200`
//! to concrete backends, so callers only deal with
//! `Box<dyn Transport>`. Backends are selected at compile time through
//! cargo features.

#![warn(missing_docs)]

#[cfg(feature = "subprocess")]
mod host;
mod registry;

#[cfg(feature = "subprocess")]
pub use host::HostFlasher;
pub use registry::{
    available_transports, create_transport, parse_transport_params, transport_names_short,
    TransportInfo, TransportParams,
};

#[cfg(feature = "serial")]
pub use registry::list_serial_ports;
#[cfg(feature = "serial")]
pub use rmicro_serial::PortInfo;
