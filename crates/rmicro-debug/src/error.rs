//! Error types for debugger operations

use thiserror::Error;

/// Debugger specific errors
#[derive(Debug, Error)]
pub enum DebugError {
    /// The debugger process could not be started
    #[error("failed to spawn debugger '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Creating or configuring the target I/O pipes failed
    #[error("failed to set up debugger pipes: {0}")]
    Pipe(#[source] std::io::Error),

    /// Changing the SIGINT disposition failed
    #[error("failed to change SIGINT handling: {0}")]
    Signal(#[source] std::io::Error),

    /// Waiting for or signalling the debugger failed
    #[error("failed to stop debugger '{command}': {source}")]
    Stop {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// No launcher is known for this operating system
    #[error("system {0} is not supported; use a custom launcher")]
    UnsupportedOs(String),

    /// No program was given to debug
    #[error("no program given to debug")]
    NoProgram,
}

/// Result type for debugger operations
pub type Result<T> = std::result::Result<T, DebugError>;

impl From<DebugError> for rmicro_core::Error {
    fn from(e: DebugError) -> Self {
        match e {
            DebugError::Spawn { command, source } => rmicro_core::Error::Spawn { command, source },
            DebugError::Pipe(source) | DebugError::Signal(source) => rmicro_core::Error::Io(source),
            DebugError::Stop { source, .. } => rmicro_core::Error::Io(source),
            e @ (DebugError::UnsupportedOs(_) | DebugError::NoProgram) => {
                rmicro_core::Error::InvalidParameter(e.to_string())
            }
        }
    }
}
