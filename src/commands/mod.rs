//! CLI command implementations
//!
//! Each submodule implements one top-level subcommand on top of the
//! library crates. Commands print results on stdout and report progress
//! through `log`.

pub mod artifact;
pub mod exchange;
pub mod layout;
mod list;

pub use list::{list_ports, list_transports};

/// Format a byte count for humans
pub(crate) fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
