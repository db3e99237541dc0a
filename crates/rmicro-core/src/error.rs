//! Error types for rmicro-core
//!
//! A single error enum is shared by every layer of the crate and by the
//! backend crates, since the `Transport` and `Debugger` traits speak it.
//! Variants are grouped by [`ErrorKind`] so callers can tell a
//! misconfiguration apart from an I/O failure without matching on each
//! variant.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A device, toolchain or target could not be resolved uniquely
    Resolution,
    /// A memory layout does not fit the available space
    Capacity,
    /// An artifact or configuration file is malformed
    Format,
    /// Reading from or writing to an OS resource failed
    Io,
    /// A child process could not be spawned or failed
    Process,
    /// An operation was attempted in the wrong lifecycle state
    Lifecycle,
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    // Resolution errors
    /// No serial port matched the search pattern
    #[error("'{pattern}' should match 1 serial port; found {candidates}")]
    PortNotFound { pattern: String, candidates: usize },

    /// More than one serial port matched the search pattern
    #[error("'{pattern}' should match 1 serial port; found {}: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousPort {
        pattern: String,
        candidates: Vec<String>,
    },

    /// No toolchain prefix matched the target CPU
    #[error("CPU '{cpu}' did not match any default toolchain prefix")]
    ToolchainNotFound { cpu: String },

    /// More than one toolchain prefix matched the target CPU
    #[error("CPU '{cpu}' matched more than one default toolchain prefix: {}; specify the prefix explicitly", .prefixes.join(", "))]
    AmbiguousToolchain { cpu: String, prefixes: Vec<String> },

    /// No target marker comment was found in the sources
    #[error("could not detect a target from sources: {}", .sources.join(", "))]
    TargetNotDetected { sources: Vec<String> },

    /// Sources disagree on the target they were generated for
    #[error("sources name more than one target: {}", .targets.join(", "))]
    AmbiguousTarget { targets: Vec<String> },

    /// The detected target differs from the configured one
    #[error("auto-detected target '{detected}' differs from configured target '{configured}'")]
    IncompatibleTarget { detected: String, configured: String },

    /// Unknown transport name in a transport spec
    #[error("unknown transport: {name}")]
    UnknownTransport { name: String },

    /// Invalid configuration parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    // Capacity errors
    /// Fixed-size sections need more bytes than are available
    #[error("sections need {requested} bytes but only {available} are available")]
    CapacityExceeded { requested: u64, available: u64 },

    /// A fixed-size section is not a whole number of words
    #[error("section '{section}' size {size} is not a multiple of the word size {word_size}")]
    MisalignedSection {
        section: String,
        size: u64,
        word_size: u64,
    },

    /// Word size is zero or not a power of two
    #[error("word size {0} is not a non-zero power of two")]
    InvalidWordSize(u64),

    /// Weighted section present but all weights are zero
    #[error("section '{section}' is weighted but the weights sum to zero")]
    ZeroWeightSum { section: String },

    /// Weight is negative, NaN or infinite
    #[error("section '{section}' has invalid weight {weight}")]
    InvalidWeight { section: String, weight: f64 },

    /// Two sections share a name
    #[error("duplicate section name '{0}'")]
    DuplicateSection(String),

    /// A section was allocated zero bytes under the strict policy
    #[error("section '{0}' was allocated zero bytes")]
    ZeroSizeSection(String),

    // Format errors
    /// Archive encoding version does not match
    #[error("artifact version mismatch: expected {expected}, found '{found}'")]
    VersionMismatch { expected: u32, found: String },

    /// Metadata record is missing or cannot be parsed
    #[error("malformed metadata in {}: {reason}", .path.display())]
    MalformedMetadata { path: PathBuf, reason: String },

    /// Label is not present in an artifact
    #[error("label '{label}' not found in artifact")]
    LabelNotFound { label: String },

    /// Path escapes its root or is otherwise not allowed
    #[error("unsafe path {0:?}")]
    UnsafePath(PathBuf),

    /// Archive holds a different kind of artifact
    #[error("expected a '{expected}' artifact, found '{found}'")]
    ArtifactTypeMismatch { expected: String, found: String },

    // I/O errors
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a named path
    #[error("{}: {source}", .path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write made no progress
    #[error("write to {0} accepted no bytes")]
    WriteZero(String),

    // Process errors
    /// A child process could not be spawned
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A child process exited unsuccessfully
    #[error("'{command}' failed: {status}")]
    ProcessFailed { command: String, status: String },

    // Lifecycle errors
    /// Transport used before open or after close
    #[error("{0} is not open")]
    NotOpen(String),

    /// Transport opened twice
    #[error("{0} is already open")]
    AlreadyOpen(String),

    /// Debugger stopped or queried while not running
    #[error("debugger '{0}' is not running")]
    NotRunning(String),

    /// Debugger started twice
    #[error("debugger '{0}' is already running")]
    AlreadyRunning(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PortNotFound { .. }
            | Self::AmbiguousPort { .. }
            | Self::ToolchainNotFound { .. }
            | Self::AmbiguousToolchain { .. }
            | Self::TargetNotDetected { .. }
            | Self::AmbiguousTarget { .. }
            | Self::IncompatibleTarget { .. }
            | Self::UnknownTransport { .. }
            | Self::InvalidParameter(_) => ErrorKind::Resolution,

            Self::CapacityExceeded { .. }
            | Self::MisalignedSection { .. }
            | Self::InvalidWordSize(_)
            | Self::ZeroWeightSum { .. }
            | Self::InvalidWeight { .. }
            | Self::DuplicateSection(_)
            | Self::ZeroSizeSection(_) => ErrorKind::Capacity,

            Self::VersionMismatch { .. }
            | Self::MalformedMetadata { .. }
            | Self::LabelNotFound { .. }
            | Self::UnsafePath(_)
            | Self::ArtifactTypeMismatch { .. } => ErrorKind::Format,

            Self::Io(_) | Self::PathIo { .. } | Self::WriteZero(_) => ErrorKind::Io,

            Self::Spawn { .. } | Self::ProcessFailed { .. } => ErrorKind::Process,

            Self::NotOpen(_)
            | Self::AlreadyOpen(_)
            | Self::NotRunning(_)
            | Self::AlreadyRunning(_) => ErrorKind::Lifecycle,
        }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_port_names_candidates() {
        let err = Error::AmbiguousPort {
            pattern: "ACM".into(),
            candidates: vec!["/dev/ttyACM0".into(), "/dev/ttyACM1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'ACM'"));
        assert!(msg.contains("found 2: /dev/ttyACM0"));
        assert!(msg.contains("/dev/ttyACM1"));
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_kinds_are_distinct() {
        let io = Error::from(std::io::Error::other("boom"));
        let spawn = Error::Spawn {
            command: "gdb".into(),
            source: std::io::Error::other("boom"),
        };
        let closed = Error::NotOpen("serial".into());
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(spawn.kind(), ErrorKind::Process);
        assert_eq!(closed.kind(), ErrorKind::Lifecycle);
    }
}
