//! Transport abstraction
//!
//! A transport is a raw byte stream to code running on a target: a
//! serial port, the stdin/stdout of a host process, or a pipe pair wired
//! through a debugger. Framing on top of the stream is not this crate's
//! concern.
//!
//! Lifecycle is `closed -> open -> closed`. Reopening a closed transport
//! is not supported by every backend. `close` must be safe to call more
//! than once; only the first call releases anything.
//!
//! # Read and write policy
//!
//! - `read(n)` blocks until at least one byte is available and returns
//!   fewer than `n` bytes only at end of stream. Each backend defines what
//!   end of stream means for it.
//! - `write(data)` returns the number of bytes accepted. Transient
//!   failures are retried only while nothing has been accepted yet; once
//!   any byte is accepted, resending the rest is the caller's job.

mod logger;
mod wrapper;

pub use logger::{hex_dump, TransportLogger};
pub use wrapper::DebugWrapperTransport;

use crate::error::{Error, Result};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};

/// Number of attempts made for a write that has not accepted any byte
pub const WRITE_RETRIES: usize = 8;

/// Byte-stream channel to deployed code
pub trait Transport: Send {
    /// Establish the channel
    fn open(&mut self) -> Result<()>;

    /// Release every OS resource held by the channel
    ///
    /// Calling this on an already closed transport is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Read up to `n` bytes
    ///
    /// Blocks until at least one byte is available. Returns fewer than `n`
    /// bytes only at end of stream.
    fn read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Write `data`, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).read(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }
}

/// An open transport that is closed when dropped
///
/// ```ignore
/// let mut session = Session::open(transport)?;
/// session.write(b"ping")?;
/// let reply = session.read(4)?;
/// session.close()?; // or just let it drop
/// ```
pub struct Session<T: Transport> {
    transport: T,
    open: bool,
}

impl<T: Transport> Session<T> {
    /// Open `transport` and wrap it in a session
    pub fn open(mut transport: T) -> Result<Self> {
        transport.open()?;
        Ok(Self {
            transport,
            open: true,
        })
    }

    /// Close the transport, reporting any error
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.transport.close()
    }
}

impl<T: Transport> Deref for Session<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> DerefMut for Session<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.transport.close() {
                log::warn!("error closing transport: {}", e);
            }
        }
    }
}

/// Run `f` with `transport` open, closing it on every exit path
///
/// An error from `f` takes precedence over an error from closing.
pub fn with_open<T, R, F>(transport: &mut T, f: F) -> Result<R>
where
    T: Transport + ?Sized,
    F: FnOnce(&mut T) -> Result<R>,
{
    transport.open()?;
    let result = f(transport);
    match (result, transport.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            log::warn!("error closing transport: {}", close_err);
            Err(e)
        }
    }
}

/// Read from `reader` until `n` bytes arrive or the stream ends
///
/// A read returning 0 bytes is end of stream.
pub fn read_to_count<R: Read + ?Sized>(reader: &mut R, n: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(count) => filled += count,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn is_retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        IoErrorKind::Interrupted | IoErrorKind::WouldBlock | IoErrorKind::TimedOut
    )
}

/// Write `data` to `writer`, returning the number of bytes accepted
///
/// Retries transient errors and zero-length writes up to
/// [`WRITE_RETRIES`] times while nothing has been accepted. After the
/// first accepted byte any failure ends the call with the partial count.
/// `resource` names the channel in errors.
pub fn write_accepted<W: Write + ?Sized>(
    writer: &mut W,
    data: &[u8],
    resource: &str,
) -> Result<usize> {
    let mut accepted = 0;
    let mut attempts = 0;

    while accepted < data.len() {
        match writer.write(&data[accepted..]) {
            Ok(0) if accepted == 0 => {
                attempts += 1;
                if attempts >= WRITE_RETRIES {
                    return Err(Error::WriteZero(resource.to_string()));
                }
            }
            Ok(0) => break,
            Ok(count) => accepted += count,
            Err(e) if accepted == 0 && is_retryable(&e) && attempts + 1 < WRITE_RETRIES => {
                attempts += 1;
                log::trace!("{}: retrying write after {}", resource, e);
            }
            Err(e) if accepted > 0 => {
                log::debug!(
                    "{}: write stopped after {} of {} bytes: {}",
                    resource,
                    accepted,
                    data.len(),
                    e
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = writer.flush() {
        if accepted == 0 {
            return Err(e.into());
        }
        log::warn!("{}: flush failed after write: {}", resource, e);
    }

    Ok(accepted)
}
