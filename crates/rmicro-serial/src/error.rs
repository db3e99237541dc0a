//! Error types for serial transport operations

use thiserror::Error;

/// Serial transport specific errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// No enumerated port matched the search pattern
    #[error("'{pattern}' should match 1 serial port; found {candidates}")]
    NotFound { pattern: String, candidates: usize },

    /// More than one enumerated port matched the search pattern
    #[error(
        "'{pattern}' should match 1 serial port; found {}: {}",
        .candidates.len(),
        .candidates.join(", ")
    )]
    Ambiguous {
        pattern: String,
        candidates: Vec<String>,
    },

    /// The search pattern is not a valid regular expression
    #[error("invalid port pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Port enumeration failed
    #[error("failed to enumerate serial ports: {0}")]
    EnumerationFailed(#[source] serialport::Error),

    /// Failed to open or configure the device
    #[error("serial port {device}: {source}")]
    Port {
        device: String,
        #[source]
        source: serialport::Error,
    },

    /// Neither a device nor a pattern was given
    #[error("no serial port specified. Use dev=/dev/ttyX or grep=PATTERN")]
    NoDevice,
}

/// Result type for serial transport operations
pub type Result<T> = std::result::Result<T, SerialError>;

impl From<SerialError> for rmicro_core::Error {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::NotFound {
                pattern,
                candidates,
            } => rmicro_core::Error::PortNotFound {
                pattern,
                candidates,
            },
            SerialError::Ambiguous {
                pattern,
                candidates,
            } => rmicro_core::Error::AmbiguousPort {
                pattern,
                candidates,
            },
            e @ (SerialError::InvalidPattern { .. } | SerialError::NoDevice) => {
                rmicro_core::Error::InvalidParameter(e.to_string())
            }
            SerialError::EnumerationFailed(source) => rmicro_core::Error::Io(source.into()),
            SerialError::Port { device, source } => {
                rmicro_core::Error::path_io(device, source.into())
            }
        }
    }
}
