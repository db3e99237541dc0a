//! rmicro-core - Core library for running code on microcontrollers
//!
//! This crate holds the pieces every backend shares: the byte-stream
//! [`Transport`](transport::Transport) and [`Debugger`](debugger::Debugger)
//! traits, the memory layout allocator, build artifacts with a portable
//! archive format, and the compiler/flasher interfaces.
//!
//! # Example
//!
//! ```ignore
//! use rmicro_core::transport::{Session, TransportLogger};
//!
//! fn ping<T: Transport>(transport: T) -> rmicro_core::Result<Vec<u8>> {
//!     let mut session = Session::open(TransportLogger::new("board", transport))?;
//!     session.write(b"\x01ping")?;
//!     let reply = session.read(4)?;
//!     session.close()?;
//!     Ok(reply)
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod artifact;
pub mod compiler;
pub mod debugger;
pub mod error;
pub mod layout;
pub mod transport;

pub use error::{Error, ErrorKind, Result};
