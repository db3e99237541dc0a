//! Debugger attached to a remote target
//!
//! Runs a GDB client against a gdbserver-style stub, e.g. one provided
//! by an on-chip debug adapter. Setting up the stub is left to a
//! [`LaunchContext`], entered before the client starts and exited after
//! it stops.

use crate::error::DebugError;
use crate::process::{terminate, DEFAULT_GRACE};
use crate::signal::SigintGuard;
use rmicro_core::debugger::Debugger;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;

/// Environment the debugger client runs in
///
/// `exit` is called once for every successful `enter`, even when the
/// debugger failed to start or had already exited.
pub trait LaunchContext: Send {
    /// Bring the environment up
    fn enter(&mut self) -> rmicro_core::Result<()>;

    /// Tear the environment down
    fn exit(&mut self) -> rmicro_core::Result<()>;
}

/// Context that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLaunchContext;

impl LaunchContext for NoLaunchContext {
    fn enter(&mut self) -> rmicro_core::Result<()> {
        Ok(())
    }

    fn exit(&mut self) -> rmicro_core::Result<()> {
        Ok(())
    }
}

/// GDB client attached to `target remote <host:port>`
pub struct GdbRemoteDebugger<C: LaunchContext = NoLaunchContext> {
    gdb_binary: OsString,
    remote_hostport: String,
    debug_binary: PathBuf,
    extra_args: Vec<OsString>,
    grace: Duration,
    context: C,
    running: Option<(Child, SigintGuard)>,
}

impl GdbRemoteDebugger<NoLaunchContext> {
    /// Attach `gdb_binary` to `remote_hostport`, symbolized with `debug_binary`
    pub fn new(
        gdb_binary: impl Into<OsString>,
        remote_hostport: impl Into<String>,
        debug_binary: impl Into<PathBuf>,
    ) -> Self {
        Self::with_context(gdb_binary, remote_hostport, debug_binary, NoLaunchContext)
    }
}

impl<C: LaunchContext> GdbRemoteDebugger<C> {
    /// Like [`GdbRemoteDebugger::new`], running inside `context`
    pub fn with_context(
        gdb_binary: impl Into<OsString>,
        remote_hostport: impl Into<String>,
        debug_binary: impl Into<PathBuf>,
        context: C,
    ) -> Self {
        Self {
            gdb_binary: gdb_binary.into(),
            remote_hostport: remote_hostport.into(),
            debug_binary: debug_binary.into(),
            extra_args: Vec::new(),
            grace: DEFAULT_GRACE,
            context,
            running: None,
        }
    }

    /// Pass extra arguments to the client
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set how long the client gets to exit after SIGTERM
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The launch context
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Client command line
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.gdb_binary);
        command
            .arg("-iex")
            .arg(format!("file {}", self.debug_binary.display()))
            .arg("-iex")
            .arg(format!("target remote {}", self.remote_hostport))
            .args(&self.extra_args);
        command
    }

    fn spawn(&self) -> rmicro_core::Result<(Child, SigintGuard)> {
        let mut command = self.command();
        let sigint = SigintGuard::ignore()?;
        let child = command.spawn().map_err(|source| DebugError::Spawn {
            command: format!("{:?}", command),
            source,
        })?;
        log::info!(
            "Started {} against {} (pid {})",
            self.gdb_binary.to_string_lossy(),
            self.remote_hostport,
            child.id()
        );
        Ok((child, sigint))
    }
}

impl<C: LaunchContext> Debugger for GdbRemoteDebugger<C> {
    fn start(&mut self) -> rmicro_core::Result<()> {
        if self.running.is_some() {
            return Err(rmicro_core::Error::AlreadyRunning(self.remote_hostport.clone()));
        }

        self.context.enter()?;
        match self.spawn() {
            Ok(running) => {
                self.running = Some(running);
                Ok(())
            }
            Err(e) => {
                if let Err(exit_err) = self.context.exit() {
                    log::warn!("error leaving launch context: {}", exit_err);
                }
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> rmicro_core::Result<()> {
        let Some((mut child, sigint)) = self.running.take() else {
            return Ok(());
        };

        let stopped = match terminate(&mut child, self.grace) {
            Ok(status) => {
                log::debug!("gdb client exited with {}", status);
                Ok(())
            }
            Err(source) => Err(DebugError::Stop {
                command: self.gdb_binary.to_string_lossy().into_owned(),
                source,
            }
            .into()),
        };
        drop(sigint);

        let exited = self.context.exit();
        if let Err(e) = &stopped {
            log::warn!("error stopping gdb client: {}", e);
        }
        stopped.and(exited)
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl<C: LaunchContext> Drop for GdbRemoteDebugger<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("error stopping debugger: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::SIGNAL_LOCK;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingContext {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl LaunchContext for RecordingContext {
        fn enter(&mut self) -> rmicro_core::Result<()> {
            self.log.lock().unwrap().push("enter");
            Ok(())
        }

        fn exit(&mut self) -> rmicro_core::Result<()> {
            self.log.lock().unwrap().push("exit");
            Ok(())
        }
    }

    #[test]
    fn test_command_line() {
        let debugger = GdbRemoteDebugger::new("arm-none-eabi-gdb", "localhost:3333", "/tmp/fw.elf")
            .args(["-q"]);
        let command = debugger.command();
        let args: Vec<_> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(command.get_program(), "arm-none-eabi-gdb");
        assert_eq!(
            args,
            [
                "-iex",
                "file /tmp/fw.elf",
                "-iex",
                "target remote localhost:3333",
                "-q"
            ]
        );
    }

    #[test]
    fn test_context_wraps_client() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let context = RecordingContext::default();
        let log = Arc::clone(&context.log);
        // `sleep` rejects the gdb flags and exits at once
        let mut debugger = GdbRemoteDebugger::with_context("sleep", "localhost:3333", "fw.elf", context)
            .grace(Duration::from_millis(100));

        debugger.start().unwrap();
        assert!(debugger.is_running());
        debugger.stop().unwrap();
        debugger.stop().unwrap();
        assert_eq!(*log.lock().unwrap(), ["enter", "exit"]);
    }

    #[test]
    fn test_context_exited_when_spawn_fails() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let context = RecordingContext::default();
        let log = Arc::clone(&context.log);
        let mut debugger = GdbRemoteDebugger::with_context(
            "/nonexistent/rmicro-gdb",
            "localhost:3333",
            "fw.elf",
            context,
        );

        assert!(debugger.start().is_err());
        assert!(!debugger.is_running());
        assert_eq!(*log.lock().unwrap(), ["enter", "exit"]);
    }
}
