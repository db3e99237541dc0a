//! Flashing for host targets
//!
//! On the host, "flashing" a binary means running it. Its stdin/stdout
//! become the transport, optionally routed through a debugger.

use rmicro_core::artifact::MicroBinary;
use rmicro_core::compiler::Flasher;
use rmicro_core::error::Result;
use rmicro_core::transport::Transport;
use rmicro_subprocess::{SubprocessConfig, SubprocessTransport};
use std::ffi::OsString;

/// Runs host binaries as subprocesses
#[derive(Debug, Clone, Default)]
pub struct HostFlasher {
    debug: bool,
    args: Vec<OsString>,
}

impl HostFlasher {
    /// Run binaries directly
    pub fn new() -> Self {
        Self::default()
    }

    /// Run binaries under the host debugger
    ///
    /// The debugger starts when the returned transport is opened and is
    /// stopped when it is closed.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Extra arguments passed to each binary
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, binary: &MicroBinary) -> Vec<OsString> {
        let mut command = vec![binary.binary_path().into_os_string()];
        command.extend(self.args.iter().cloned());
        command
    }
}

impl Flasher for HostFlasher {
    fn flash(&mut self, binary: &MicroBinary) -> Result<Box<dyn Transport>> {
        let mut command = self.command(binary);
        log::info!("Running {}", binary.binary_path().display());

        if self.debug {
            return debug_transport(command);
        }

        let program = command.remove(0);
        Ok(Box::new(SubprocessTransport::new(SubprocessConfig::new(
            program, command,
        ))))
    }
}

#[cfg(all(feature = "debug", unix))]
fn debug_transport(command: Vec<OsString>) -> Result<Box<dyn Transport>> {
    use rmicro_core::transport::DebugWrapperTransport;
    use rmicro_debug::GdbTransportDebugger;

    let debugger = GdbTransportDebugger::new(command)?;
    let transport = debugger.transport();
    Ok(Box::new(DebugWrapperTransport::new(debugger, transport)))
}

#[cfg(all(feature = "debug", not(unix)))]
fn debug_transport(_command: Vec<OsString>) -> Result<Box<dyn Transport>> {
    Err(rmicro_debug::DebugError::UnsupportedOs(std::env::consts::OS.to_string()).into())
}

#[cfg(not(feature = "debug"))]
fn debug_transport(_command: Vec<OsString>) -> Result<Box<dyn Transport>> {
    Err(rmicro_core::Error::InvalidParameter(
        "built without debugger support (enable the 'debug' feature)".into(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rmicro_core::artifact::Metadata;
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::path::Path;

    /// Binary artifact whose executable is a link to a system tool
    fn linked_binary(dir: &Path, tool: &str) -> MicroBinary {
        symlink(tool, dir.join("micro_binary")).unwrap();
        MicroBinary::new(dir, "micro_binary", Vec::new(), Metadata::new()).unwrap()
    }

    #[test]
    fn test_flash_runs_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = linked_binary(dir.path(), "/bin/cat");

        let mut transport = HostFlasher::new().flash(&binary).unwrap();
        transport.open().unwrap();
        assert_eq!(transport.write(b"ping").unwrap(), 4);
        assert_eq!(transport.read(4).unwrap(), b"ping");
        transport.close().unwrap();
    }

    #[test]
    fn test_flash_passes_args() {
        let dir = tempfile::tempdir().unwrap();
        let binary = linked_binary(dir.path(), "/bin/sh");

        let mut transport = HostFlasher::new()
            .args(["-c", "printf hello"])
            .flash(&binary)
            .unwrap();
        transport.open().unwrap();
        assert_eq!(transport.read(16).unwrap(), b"hello");
        transport.close().unwrap();
    }

    #[test]
    fn test_flash_unarchived_binary() {
        let scratch = tempfile::tempdir().unwrap();
        let build = scratch.path().join("build");
        fs::create_dir(&build).unwrap();
        let script = build.join("echo.sh");
        fs::write(&script, "#!/bin/sh\ncat\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let binary = MicroBinary::new(&build, "echo.sh", Vec::new(), Metadata::new()).unwrap();
        let tar_path = binary.archive(scratch.path()).unwrap();
        let restored = MicroBinary::unarchive(&tar_path, scratch.path().join("deployed")).unwrap();

        let mode = fs::metadata(restored.binary_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        let mut transport = HostFlasher::new().flash(&restored).unwrap();
        transport.open().unwrap();
        assert_eq!(transport.write(b"\x01\x02pong").unwrap(), 6);
        assert_eq!(transport.read(6).unwrap(), b"\x01\x02pong");
        transport.close().unwrap();
    }
}
