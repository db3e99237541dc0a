//! Debugger lifecycle abstraction
//!
//! A debugger supervises the process running the deployed code. Its
//! lifecycle is `stopped -> running -> stopped`. Backends live in
//! `rmicro-debug`.

use crate::error::Result;

/// Debugger session manager
pub trait Debugger: Send {
    /// Launch the debugger without waiting for the debuggee to finish
    fn start(&mut self) -> Result<()>;

    /// Terminate the debugger
    ///
    /// Must succeed if the debugger process already exited on its own.
    fn stop(&mut self) -> Result<()>;

    /// Whether the debugger has been started and not yet stopped
    fn is_running(&self) -> bool;
}

impl<D: Debugger + ?Sized> Debugger for Box<D> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
