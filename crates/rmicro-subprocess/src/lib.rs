//! rmicro-subprocess - Host process transport
//!
//! Runs a program on the host with its stdin and stdout connected to
//! pipes and exposes them as a transport. Used to talk to code built
//! for the host CPU.
//!
//! # End of stream
//!
//! A read ends early only when the child closes its stdout, usually by
//! exiting.
//!
//! # Closing
//!
//! `close` closes the child's stdin and waits one grace period for it to
//! exit. A child still running is sent SIGTERM and given another grace
//! period, then SIGKILL. A child that exited unsuccessfully before any
//! signal was sent is reported as [`SubprocessError::Exited`].

pub mod error;

pub use error::{Result, SubprocessError};

use rmicro_core::transport::{read_to_count, write_accepted, Transport};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Default time a child gets to exit at each step of `close`
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Subprocess transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessConfig {
    /// Program to run
    pub program: OsString,
    /// Arguments
    pub args: Vec<OsString>,
    /// Working directory, inherited when `None`
    pub cwd: Option<PathBuf>,
    /// Grace period at each step of `close`
    pub grace: Duration,
}

impl SubprocessConfig {
    /// Run `program` with `args`
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            grace: DEFAULT_GRACE,
        }
    }

    /// Parse a whitespace separated command line
    pub fn from_command_line(cmd: &str) -> Result<Self> {
        let mut words = cmd.split_whitespace();
        let program = words.next().ok_or(SubprocessError::NoCommand)?;
        Ok(Self::new(program, words))
    }

    /// Set the grace period
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Command line for messages
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

/// Transport over a child process's stdin and stdout
pub struct SubprocessTransport {
    config: SubprocessConfig,
    command: String,
    running: Option<Running>,
}

impl SubprocessTransport {
    /// Create a transport that runs `config` when opened
    pub fn new(config: SubprocessConfig) -> Self {
        let command = config.display();
        Self {
            config,
            command,
            running: None,
        }
    }

    /// Command line of the child
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Process id of the running child
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|running| running.child.id())
    }

    fn running(&mut self) -> rmicro_core::Result<&mut Running> {
        self.running
            .as_mut()
            .ok_or_else(|| rmicro_core::Error::NotOpen(self.command.clone()))
    }

    fn stop_child(&self, child: &mut Child) -> Result<()> {
        let stop_err = |source| SubprocessError::Stop {
            command: self.command.clone(),
            source,
        };

        if let Some(status) = wait_timeout(child, self.config.grace).map_err(stop_err)? {
            log::debug!("'{}' exited with {}", self.command, status);
            if !status.success() {
                return Err(SubprocessError::Exited {
                    command: self.command.clone(),
                    status: status.to_string(),
                });
            }
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            log::debug!("'{}' still running, sending SIGTERM", self.command);
            if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
                log::warn!("failed to signal '{}': {}", self.command, e);
            }
            if wait_timeout(child, self.config.grace)
                .map_err(stop_err)?
                .is_some()
            {
                return Ok(());
            }
        }

        log::warn!("'{}' did not exit, killing it", self.command);
        child.kill().map_err(stop_err)?;
        child.wait().map_err(stop_err)?;
        Ok(())
    }
}

/// Wait up to `timeout` for `child` to exit
fn wait_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

impl Transport for SubprocessTransport {
    fn open(&mut self) -> rmicro_core::Result<()> {
        if self.running.is_some() {
            return Err(rmicro_core::Error::AlreadyOpen(self.command.clone()));
        }

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| SubprocessError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(rmicro_core::Error::NotOpen(self.command.clone()));
        };

        log::info!("Started '{}' (pid {})", self.command, child.id());
        self.running = Some(Running {
            child,
            stdin: Some(stdin),
            stdout,
        });
        Ok(())
    }

    fn close(&mut self) -> rmicro_core::Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        drop(running.stdin.take());
        let result = self.stop_child(&mut running.child);
        drop(running.stdout);

        log::debug!("'{}' closed", self.command);
        result.map_err(Into::into)
    }

    fn read(&mut self, n: usize) -> rmicro_core::Result<Vec<u8>> {
        let running = self.running()?;
        Ok(read_to_count(&mut running.stdout, n)?)
    }

    fn write(&mut self, data: &[u8]) -> rmicro_core::Result<usize> {
        let command = self.command.clone();
        let running = self.running()?;
        let stdin = running
            .stdin
            .as_mut()
            .ok_or_else(|| rmicro_core::Error::NotOpen(command.clone()))?;
        write_accepted(stdin, data, &command)
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing subprocess transport: {}", e);
        }
    }
}
