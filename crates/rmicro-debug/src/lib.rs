//! rmicro-debug - Debugger sessions
//!
//! Two ways to run deployed code under a debugger:
//!
//! - [`GdbTransportDebugger`] runs a host binary under gdb (or lldb on
//!   macOS) with the program's stdin and stdout redirected to pipes, and
//!   hands out a [`DebuggerPipeTransport`] over them.
//! - [`GdbRemoteDebugger`] attaches a gdb client to a remote stub.
//!
//! While either runs, SIGINT is ignored in this process so Ctrl-C reaches
//! the debugger only.

pub mod error;

#[cfg(unix)]
mod pipe;
#[cfg(unix)]
mod process;
#[cfg(unix)]
mod remote;
#[cfg(unix)]
mod signal;

pub use error::{DebugError, Result};

#[cfg(unix)]
pub use pipe::{DebuggerPipeTransport, GdbTransportDebugger, LaunchFn, Launcher, TargetFds};
#[cfg(unix)]
pub use process::DEFAULT_GRACE;
#[cfg(unix)]
pub use remote::{GdbRemoteDebugger, LaunchContext, NoLaunchContext};
#[cfg(unix)]
pub use signal::SigintGuard;
