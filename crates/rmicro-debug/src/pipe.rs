//! Debugger that doubles as the transport
//!
//! The debuggee's stdin and stdout are redirected to two pipes whose
//! other ends stay in this process. The debugger itself keeps the
//! terminal, so the user can drive it interactively while the transport
//! talks to the program through the pipes.
//!
//! ```text
//!   transport.write --> [stdin pipe]  --> /dev/fd/N --> debuggee stdin
//!   transport.read  <-- [stdout pipe] <-- /dev/fd/M <-- debuggee stdout
//! ```

use crate::error::{DebugError, Result};
use crate::process::{signal_pid, wait_until, DEFAULT_GRACE};
use crate::signal::SigintGuard;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::Signal;
use rmicro_core::debugger::Debugger;
use rmicro_core::transport::{read_to_count, write_accepted, Transport};
use std::ffi::OsString;
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Descriptors the debuggee should use for its stdin and stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFds {
    /// Read end of the stdin pipe
    pub stdin: RawFd,
    /// Write end of the stdout pipe
    pub stdout: RawFd,
}

/// Builds a custom debugger command line
pub type LaunchFn = dyn Fn(&[OsString], TargetFds) -> Command + Send;

/// How the debugger process is launched
pub enum Launcher {
    /// `gdb --args <prog> <args> </dev/fd/N >/dev/fd/M`
    Gdb,
    /// `lldb -O "target create <prog>"` with input and output paths set
    Lldb,
    /// Caller supplied command builder
    Custom(Box<LaunchFn>),
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gdb => write!(f, "Gdb"),
            Self::Lldb => write!(f, "Lldb"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Launcher {
    /// Launcher for the running operating system
    pub fn for_host() -> Result<Self> {
        match std::env::consts::OS {
            "linux" => Ok(Self::Gdb),
            "macos" => Ok(Self::Lldb),
            other => Err(DebugError::UnsupportedOs(other.to_string())),
        }
    }

    /// Build the debugger command for `program` (program path first)
    pub fn command(&self, program: &[OsString], fds: TargetFds) -> Result<Command> {
        let (exe, args) = program.split_first().ok_or(DebugError::NoProgram)?;

        let command = match self {
            Self::Gdb => {
                let mut command = Command::new("gdb");
                command
                    .arg("--args")
                    .arg(exe)
                    .args(args)
                    .arg(format!("</dev/fd/{}", fds.stdin))
                    .arg(format!(">/dev/fd/{}", fds.stdout));
                command
            }
            Self::Lldb => {
                let mut command = Command::new("lldb");
                command
                    .arg("-O")
                    .arg(format!("target create {}", exe.to_string_lossy()))
                    .arg("-O")
                    .arg(format!("settings set target.input-path /dev/fd/{}", fds.stdin))
                    .arg("-O")
                    .arg(format!("settings set target.output-path /dev/fd/{}", fds.stdout));
                if !args.is_empty() {
                    let joined = args
                        .iter()
                        .map(|arg| arg.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ");
                    command
                        .arg("-O")
                        .arg(format!("settings set target.run-args {}", joined));
                }
                command
            }
            Self::Custom(build) => build(program, fds),
        };
        Ok(command)
    }
}

/// Parent ends of the target I/O pipes
///
/// `None` when closed. Closing is idempotent. When the debugger exits the
/// watcher closes only the write end; the read end drains whatever the
/// debuggee printed and then reports end of stream.
#[derive(Debug, Default)]
struct PipeEnds {
    to_target: Mutex<Option<File>>,
    from_target: Mutex<Option<File>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PipeEnds {
    fn install(&self, to_target: File, from_target: File) {
        *lock(&self.to_target) = Some(to_target);
        *lock(&self.from_target) = Some(from_target);
    }

    fn close_to_target(&self) {
        drop(lock(&self.to_target).take());
    }

    fn close(&self) {
        self.close_to_target();
        drop(lock(&self.from_target).take());
    }

    fn is_open(&self) -> bool {
        lock(&self.to_target).is_some() || lock(&self.from_target).is_some()
    }
}

/// Pipe with both ends close-on-exec
///
/// The debuggee's ends are made inheritable only inside the forked
/// child, so processes spawned concurrently by other threads never see
/// them.
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe().map_err(|e| DebugError::Pipe(e.into()))?;
    for end in [&read, &write] {
        fcntl(end.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|e| DebugError::Pipe(e.into()))?;
    }
    Ok((read, write))
}

/// Clear close-on-exec on `fds` in the child between fork and exec
fn inherit_in_child(command: &mut Command, fds: TargetFds) {
    use std::os::unix::process::CommandExt;

    // SAFETY: the hook only calls fcntl, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            for fd in [fds.stdin, fds.stdout] {
                fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
            }
            Ok(())
        });
    }
}

struct Running {
    pid: u32,
    exited: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
    _sigint: SigintGuard,
}

/// Debugger whose debuggee is reachable through [`DebuggerPipeTransport`]
pub struct GdbTransportDebugger {
    program: Vec<OsString>,
    launcher: Launcher,
    grace: Duration,
    pipes: Arc<PipeEnds>,
    session: Option<Running>,
}

impl GdbTransportDebugger {
    /// Debug `program` (path, then arguments) with the host's debugger
    pub fn new<I, S>(program: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Ok(Self::with_launcher(program, Launcher::for_host()?))
    }

    /// Debug `program` with a specific launcher
    pub fn with_launcher<I, S>(program: I, launcher: Launcher) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into_iter().map(Into::into).collect(),
            launcher,
            grace: DEFAULT_GRACE,
            pipes: Arc::default(),
            session: None,
        }
    }

    /// Set how long the debugger gets to exit after SIGTERM
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Transport to the debuggee
    ///
    /// It can be created before `start`, but only opens while the
    /// debugger runs.
    pub fn transport(&self) -> DebuggerPipeTransport {
        DebuggerPipeTransport {
            pipes: Arc::clone(&self.pipes),
            open: false,
        }
    }

    /// Process id of the debugger
    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|session| session.pid)
    }

    /// Whether the debugger process has exited
    pub fn has_exited(&self) -> bool {
        self.session
            .as_ref()
            .map_or(true, |session| session.exited.load(Ordering::Acquire))
    }

    fn name(&self) -> String {
        self.program
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn launch(&self) -> Result<Running> {
        let (stdin_read, stdin_write) = cloexec_pipe()?;
        let (stdout_read, stdout_write) = cloexec_pipe()?;

        let fds = TargetFds {
            stdin: stdin_read.as_raw_fd(),
            stdout: stdout_write.as_raw_fd(),
        };
        let mut command = self.launcher.command(&self.program, fds)?;
        let display = format!("{:?}", command);
        inherit_in_child(&mut command, fds);

        // Started before the debugger so a failure here leaves no child behind
        let exited = Arc::new(AtomicBool::new(false));
        let (child_tx, child_rx) = mpsc::channel::<Child>();
        let watcher = {
            let exited = Arc::clone(&exited);
            let pipes = Arc::clone(&self.pipes);
            std::thread::Builder::new()
                .name("debugger-watch".into())
                .spawn(move || {
                    let Ok(mut child) = child_rx.recv() else {
                        return;
                    };
                    let pid = child.id();
                    match child.wait() {
                        Ok(status) => log::debug!("debugger pid {} exited with {}", pid, status),
                        Err(e) => log::warn!("waiting for debugger pid {}: {}", pid, e),
                    }
                    exited.store(true, Ordering::Release);
                    pipes.close_to_target();
                })
                .map_err(DebugError::Pipe)?
        };

        let sigint = SigintGuard::ignore()?;
        let child = command.spawn().map_err(|source| DebugError::Spawn {
            command: display.clone(),
            source,
        })?;

        // The child holds its own copies now.
        drop(stdin_read);
        drop(stdout_write);
        self.pipes
            .install(File::from(stdin_write), File::from(stdout_read));

        let pid = child.id();
        if let Err(mpsc::SendError(mut child)) = child_tx.send(child) {
            log::warn!("debugger watcher is gone, killing pid {}", pid);
            let _ = child.kill();
            let _ = child.wait();
            return Err(DebugError::Pipe(std::io::Error::other("debugger watcher exited early")));
        }

        log::info!("Started debugger {} (pid {})", display, pid);
        Ok(Running {
            pid,
            exited,
            watcher,
            _sigint: sigint,
        })
    }
}

impl Debugger for GdbTransportDebugger {
    fn start(&mut self) -> rmicro_core::Result<()> {
        if self.session.is_some() {
            return Err(rmicro_core::Error::AlreadyRunning(self.name()));
        }
        let session = self.launch().inspect_err(|_| self.pipes.close())?;
        self.session = Some(session);
        Ok(())
    }

    fn stop(&mut self) -> rmicro_core::Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if !session.exited.load(Ordering::Acquire) {
            signal_pid(session.pid, Signal::SIGTERM);
            let exited = &session.exited;
            if !wait_until(self.grace, || exited.load(Ordering::Acquire)) {
                log::warn!("debugger pid {} ignored SIGTERM, killing it", session.pid);
                signal_pid(session.pid, Signal::SIGKILL);
            }
        }

        if session.watcher.join().is_err() {
            log::warn!("debugger watcher thread panicked");
        }
        self.pipes.close();
        log::debug!("debugger for {} stopped", self.name());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for GdbTransportDebugger {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("error stopping debugger: {}", e);
        }
    }
}

/// Transport over the debuggee's redirected stdin and stdout
///
/// Reads end early when the debugger exits and the pipes close.
#[derive(Debug)]
pub struct DebuggerPipeTransport {
    pipes: Arc<PipeEnds>,
    open: bool,
}

impl DebuggerPipeTransport {
    fn check_open(&self) -> rmicro_core::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(rmicro_core::Error::NotOpen("debugger pipe".into()))
        }
    }
}

impl Transport for DebuggerPipeTransport {
    fn open(&mut self) -> rmicro_core::Result<()> {
        if !self.pipes.is_open() {
            return Err(rmicro_core::Error::NotRunning("debugger pipe".into()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> rmicro_core::Result<()> {
        // The pipe ends belong to the debugger, which closes them on stop.
        self.open = false;
        Ok(())
    }

    fn read(&mut self, n: usize) -> rmicro_core::Result<Vec<u8>> {
        self.check_open()?;
        let mut from_target = lock(&self.pipes.from_target);
        match from_target.as_mut() {
            Some(file) => Ok(read_to_count(file, n)?),
            None => Ok(Vec::new()),
        }
    }

    fn write(&mut self, data: &[u8]) -> rmicro_core::Result<usize> {
        self.check_open()?;
        let mut to_target = lock(&self.pipes.to_target);
        let file = to_target
            .as_mut()
            .ok_or_else(|| rmicro_core::Error::NotOpen("debugger pipe".into()))?;
        write_accepted(file, data, "debugger pipe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::SIGNAL_LOCK;
    use rmicro_core::transport::DebugWrapperTransport;
    use rmicro_core::ErrorKind;

    fn cat_launcher() -> Launcher {
        Launcher::Custom(Box::new(|_program: &[OsString], fds: TargetFds| {
            let mut command = Command::new("sh");
            command.arg("-c").arg(format!(
                "exec cat </dev/fd/{} >/dev/fd/{}",
                fds.stdin, fds.stdout
            ));
            command
        }))
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_pipe_ends_not_inherited_by_default() {
        let (read, write) = cloexec_pipe().unwrap();
        for end in [&read, &write] {
            let flags = fcntl(end.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn test_gdb_command_line() {
        let fds = TargetFds { stdin: 5, stdout: 8 };
        let program = [OsString::from("./micro_binary"), OsString::from("-v")];
        let command = Launcher::Gdb.command(&program, fds).unwrap();
        assert_eq!(command.get_program(), "gdb");
        assert_eq!(
            args(&command),
            ["--args", "./micro_binary", "-v", "</dev/fd/5", ">/dev/fd/8"]
        );
    }

    #[test]
    fn test_lldb_command_line() {
        let fds = TargetFds { stdin: 5, stdout: 8 };
        let program = [OsString::from("./micro_binary"), OsString::from("-v")];
        let command = Launcher::Lldb.command(&program, fds).unwrap();
        assert_eq!(command.get_program(), "lldb");
        assert_eq!(
            args(&command),
            [
                "-O",
                "target create ./micro_binary",
                "-O",
                "settings set target.input-path /dev/fd/5",
                "-O",
                "settings set target.output-path /dev/fd/8",
                "-O",
                "settings set target.run-args -v",
            ]
        );
        assert!(matches!(
            Launcher::Gdb.command(&[], fds),
            Err(DebugError::NoProgram)
        ));
    }

    #[test]
    fn test_pipes_reach_debuggee() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let debugger = GdbTransportDebugger::with_launcher(["prog"], cat_launcher());
        let transport = debugger.transport();
        let mut wrapper = DebugWrapperTransport::new(debugger, transport);

        wrapper.open().unwrap();
        assert!(wrapper.debugger().is_running());
        assert_eq!(wrapper.write(b"ping").unwrap(), 4);
        assert_eq!(wrapper.read(4).unwrap(), b"ping");
        wrapper.close().unwrap();
        assert!(!wrapper.debugger().is_running());
        wrapper.close().unwrap();
    }

    #[test]
    fn test_watcher_closes_pipes_on_exit() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let launcher = Launcher::Custom(Box::new(|_program: &[OsString], fds: TargetFds| {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(format!("printf done >/dev/fd/{}", fds.stdout));
            command
        }));
        let mut debugger = GdbTransportDebugger::with_launcher(["prog"], launcher);
        let mut transport = debugger.transport();

        debugger.start().unwrap();
        transport.open().unwrap();
        assert_eq!(transport.read(64).unwrap(), b"done");
        assert!(wait_until(Duration::from_secs(5), || debugger.has_exited()));
        assert_eq!(transport.read(64).unwrap(), b"");
        debugger.stop().unwrap();
        debugger.stop().unwrap();
    }

    #[test]
    fn test_stop_kills_stubborn_debugger() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let launcher = Launcher::Custom(Box::new(|_program: &[OsString], _fds: TargetFds| {
            let mut command = Command::new("sh");
            command.arg("-c").arg("trap '' TERM; exec sleep 30");
            command
        }));
        let mut debugger = GdbTransportDebugger::with_launcher(["prog"], launcher)
            .grace(Duration::from_millis(100));
        debugger.start().unwrap();
        assert!(debugger.pid().is_some());
        debugger.stop().unwrap();
        assert!(!debugger.is_running());
    }

    #[test]
    fn test_transport_needs_running_debugger() {
        let debugger = GdbTransportDebugger::with_launcher(["prog"], cat_launcher());
        let mut transport = debugger.transport();
        assert_eq!(transport.open().unwrap_err().kind(), ErrorKind::Lifecycle);
        assert_eq!(transport.read(1).unwrap_err().kind(), ErrorKind::Lifecycle);
    }

    #[test]
    fn test_spawn_failure_leaves_nothing_running() {
        let _lock = SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let launcher = Launcher::Custom(Box::new(|_program: &[OsString], _fds: TargetFds| {
            Command::new("/nonexistent/rmicro-debugger")
        }));
        let mut debugger = GdbTransportDebugger::with_launcher(["prog"], launcher);
        let err = debugger.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Process);
        assert!(!debugger.is_running());
        assert!(!debugger.transport().pipes.is_open());
    }
}
