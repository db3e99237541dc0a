//! Error types for subprocess transport operations

use thiserror::Error;

/// Subprocess transport specific errors
#[derive(Debug, Error)]
pub enum SubprocessError {
    /// The child could not be started
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The child exited unsuccessfully on its own
    #[error("'{command}' exited with {status}")]
    Exited { command: String, status: String },

    /// Waiting for or signalling the child failed
    #[error("failed to stop '{command}': {source}")]
    Stop {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command line is empty
    #[error("no command specified. Use cmd=PROGRAM")]
    NoCommand,
}

/// Result type for subprocess transport operations
pub type Result<T> = std::result::Result<T, SubprocessError>;

impl From<SubprocessError> for rmicro_core::Error {
    fn from(e: SubprocessError) -> Self {
        match e {
            SubprocessError::Spawn { command, source } => {
                rmicro_core::Error::Spawn { command, source }
            }
            SubprocessError::Exited { command, status } => {
                rmicro_core::Error::ProcessFailed { command, status }
            }
            SubprocessError::Stop { source, .. } => rmicro_core::Error::Io(source),
            e @ SubprocessError::NoCommand => rmicro_core::Error::InvalidParameter(e.to_string()),
        }
    }
}
