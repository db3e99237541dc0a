//! Memory layout support
//!
//! Partitions a target's linear address space into named sections. Each
//! section is either a fixed number of bytes or a weighted share of what
//! the fixed sections leave over:
//!
//! ```ignore
//! let layout = allocate(0x2000_0000, 320_000, 4, &[
//!     SectionConstraint::bytes("text", 7500),
//!     SectionConstraint::weight("heap", 50.0),
//!     SectionConstraint::bytes("stack", 32),
//! ])?;
//! let heap = layout.get("heap").unwrap();
//! ```
//!
//! Layouts can also be described in a TOML device file; see
//! [`DeviceConfig`].

mod allocate;
mod toml;
mod types;

pub use allocate::{allocate, allocate_with_policy};
pub use toml::{parse_size, DeviceConfig};
pub use types::*;
