//! Transport wrapped in a debugger session

use super::Transport;
use crate::debugger::Debugger;
use crate::error::Result;

/// Transport whose open/close also start/stop a debugger
///
/// `open` starts the debugger, then opens the inner transport; if that
/// fails the debugger is stopped before the error is returned. `close`
/// closes the inner transport, then stops the debugger, attempting both
/// even if the first fails.
pub struct DebugWrapperTransport<D: Debugger, T: Transport> {
    debugger: D,
    transport: T,
}

impl<D: Debugger, T: Transport> DebugWrapperTransport<D, T> {
    /// Wrap `transport` in a session of `debugger`
    pub fn new(debugger: D, transport: T) -> Self {
        Self {
            debugger,
            transport,
        }
    }

    /// Get the debugger
    pub fn debugger(&self) -> &D {
        &self.debugger
    }

    /// Get the inner transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unwrap into the debugger and inner transport
    pub fn into_parts(self) -> (D, T) {
        (self.debugger, self.transport)
    }
}

impl<D: Debugger, T: Transport> Transport for DebugWrapperTransport<D, T> {
    fn open(&mut self) -> Result<()> {
        self.debugger.start()?;

        if let Err(e) = self.transport.open() {
            log::debug!("inner transport failed to open, stopping debugger");
            if let Err(stop_err) = self.debugger.stop() {
                log::warn!("error stopping debugger after failed open: {}", stop_err);
            }
            return Err(e);
        }

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let closed = self.transport.close();
        if let Err(e) = &closed {
            log::warn!("error closing inner transport: {}", e);
        }

        let stopped = if self.debugger.is_running() {
            self.debugger.stop()
        } else {
            Ok(())
        };

        closed.and(stopped)
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        self.transport.read(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.transport.write(data)
    }
}
