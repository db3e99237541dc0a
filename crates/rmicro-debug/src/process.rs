//! Stopping debugger processes

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

/// Default time a debugger gets to exit after SIGTERM
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Send `sig` to `pid`, ignoring a process that is already gone
pub(crate) fn signal_pid(pid: u32, sig: Signal) {
    match kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => log::warn!("failed to send {} to pid {}: {}", sig, pid, e),
    }
}

/// Poll `done` until it returns true or `timeout` passes
pub(crate) fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM `child`, then SIGKILL it if it outlives `grace`, and reap it
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    signal_pid(child.id(), Signal::SIGTERM);

    let mut status = None;
    let mut error = None;
    wait_until(grace, || match child.try_wait() {
        Ok(Some(s)) => {
            status = Some(s);
            true
        }
        Ok(None) => false,
        Err(e) => {
            error = Some(e);
            true
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    if let Some(status) = status {
        return Ok(status);
    }

    log::warn!("pid {} ignored SIGTERM, killing it", child.id());
    child.kill()?;
    child.wait()
}
