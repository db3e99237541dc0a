//! Transport registry
//!
//! Builds transports from a spec string, so the CLI and config files can
//! name a transport without knowing its type.
//!
//! Format: `name` or `name:key1=value1,key2=value2`. The `log=<level>`
//! key is accepted by every transport and wraps it in a
//! [`TransportLogger`].

use rmicro_core::error::{Error, Result};
use rmicro_core::transport::{Transport, TransportLogger};
use std::collections::HashMap;

/// Parsed transport parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportParams {
    /// Transport name
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl TransportParams {
    fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|e| {
                    Error::InvalidParameter(format!(
                        "{}: invalid {}='{}': {}",
                        self.name, key, value, e
                    ))
                })
            })
            .transpose()
    }

    fn warn_unknown(&self, known: &[&str]) {
        for key in self.params.keys() {
            if key != "log" && !known.contains(&key.as_str()) {
                log::warn!("{}: ignoring unknown parameter '{}'", self.name, key);
            }
        }
    }
}

/// Parse a transport string into name and parameters
///
/// # Example
/// ```ignore
/// let params = parse_transport_params("serial:dev=/dev/ttyACM0,baud=9600")?;
/// assert_eq!(params.name, "serial");
/// assert_eq!(params.params.get("baud"), Some(&"9600".to_string()));
/// ```
pub fn parse_transport_params(s: &str) -> Result<TransportParams> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(Error::InvalidParameter(format!(
                    "invalid parameter format: '{}' (expected key=value)",
                    opt
                )));
            }
        }
    }

    Ok(TransportParams {
        name: name.to_string(),
        params,
    })
}

/// Build an unopened transport from a spec string
///
/// # Example
/// ```ignore
/// let mut transport = create_transport("subprocess:cmd=./micro_binary,log=debug")?;
/// transport.open()?;
/// ```
pub fn create_transport(spec: &str) -> Result<Box<dyn Transport>> {
    let params = parse_transport_params(spec)?;

    let transport: Box<dyn Transport> = match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => create_dummy(&params)?,

        #[cfg(feature = "serial")]
        "serial" | "uart" => create_serial(&params)?,

        #[cfg(feature = "subprocess")]
        "subprocess" | "host" => create_subprocess(&params)?,

        _ => {
            return Err(Error::UnknownTransport {
                name: params.name.clone(),
            })
        }
    };

    wrap_logger(&params, transport)
}

fn wrap_logger(params: &TransportParams, transport: Box<dyn Transport>) -> Result<Box<dyn Transport>> {
    let Some(level) = params.parse::<log::Level>("log")? else {
        return Ok(transport);
    };
    Ok(Box::new(
        TransportLogger::new(params.name.clone(), transport).with_level(level),
    ))
}

#[cfg(feature = "dummy")]
fn create_dummy(params: &TransportParams) -> Result<Box<dyn Transport>> {
    params.warn_unknown(&["loopback", "chunk", "fail_open"]);
    let config = rmicro_dummy::DummyConfig {
        loopback: params.parse("loopback")?.unwrap_or(true),
        fail_open: params.parse("fail_open")?.unwrap_or(false),
        max_write_chunk: params.parse("chunk")?,
        initial_rx: Vec::new(),
    };
    Ok(Box::new(rmicro_dummy::DummyTransport::new(config)))
}

#[cfg(feature = "serial")]
fn create_serial(params: &TransportParams) -> Result<Box<dyn Transport>> {
    use rmicro_serial::{SerialConfig, SerialError, SerialTransport};

    params.warn_unknown(&["dev", "grep", "baud", "chunk", "exclusive"]);

    let mut config = match (params.get("dev"), params.get("grep")) {
        (Some(dev), None) => SerialConfig::device(dev),
        (None, Some(pattern)) => SerialConfig::grep(pattern),
        (Some(_), Some(_)) => {
            return Err(Error::InvalidParameter(
                "serial: dev= and grep= are mutually exclusive".into(),
            ))
        }
        (None, None) => return Err(SerialError::NoDevice.into()),
    };
    if let Some(baud) = params.parse("baud")? {
        config.baud = baud;
    }
    if let Some(exclusive) = params.parse("exclusive")? {
        config.exclusive = exclusive;
    }
    config.write_chunk = params.parse("chunk")?;

    rmicro_serial::install_exit_hook();
    Ok(Box::new(SerialTransport::new(config)))
}

#[cfg(feature = "subprocess")]
fn create_subprocess(params: &TransportParams) -> Result<Box<dyn Transport>> {
    use rmicro_subprocess::{SubprocessConfig, SubprocessError, SubprocessTransport};
    use std::time::Duration;

    params.warn_unknown(&["cmd", "grace_ms"]);

    let cmd = params.get("cmd").ok_or(SubprocessError::NoCommand)?;
    let mut config = SubprocessConfig::from_command_line(cmd)?;
    if let Some(ms) = params.parse::<u64>("grace_ms")? {
        config.grace = Duration::from_millis(ms);
    }
    Ok(Box::new(SubprocessTransport::new(config)))
}

/// Serial ports on this machine, optionally filtered by a regex
///
/// The pattern is matched the same way `serial:grep=` matches it.
#[cfg(feature = "serial")]
pub fn list_serial_ports(pattern: Option<&str>) -> Result<Vec<rmicro_serial::PortInfo>> {
    use rmicro_serial::{grep_ports, PortLister, SystemPortLister};

    let ports = match pattern {
        Some(pattern) => grep_ports(pattern, &SystemPortLister)?,
        None => SystemPortLister.list_ports()?,
    };
    Ok(ports)
}

/// Information about a transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available transports (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "dummy")]
    transports.push(TransportInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory transport for testing (loopback=<bool>,chunk=<n>)",
    });

    #[cfg(feature = "serial")]
    transports.push(TransportInfo {
        name: "serial",
        aliases: &["uart"],
        description: "Serial port (dev=<port> or grep=<regex>,baud=<rate>)",
    });

    #[cfg(feature = "subprocess")]
    transports.push(TransportInfo {
        name: "subprocess",
        aliases: &["host"],
        description: "Host process stdin/stdout (cmd=<command line>,grace_ms=<ms>)",
    });

    transports
}

/// Get a short comma-separated list of transport names
pub fn transport_names_short() -> String {
    let transports = available_transports();
    if transports.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = transports.iter().map(|t| t.name).collect();
    names.join(", ")
}
