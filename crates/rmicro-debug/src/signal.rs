//! SIGINT suppression while an interactive debugger runs

use crate::error::{DebugError, Result};
use nix::sys::signal::{signal, SigHandler, Signal};
use std::sync::{Mutex, MutexGuard};

/// Live guards and the disposition the first one replaced
struct Suppression {
    guards: usize,
    previous: SigHandler,
}

static SUPPRESSION: Mutex<Suppression> = Mutex::new(Suppression {
    guards: 0,
    previous: SigHandler::SigDfl,
});

fn suppression() -> MutexGuard<'static, Suppression> {
    SUPPRESSION
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ignores SIGINT for as long as it is alive
///
/// Ctrl-C at the terminal is meant for the debugger, not for us. Guards
/// are counted process-wide: the first one installs `SIG_IGN` and the
/// last one dropped restores the disposition found before the first, in
/// whatever order overlapping debuggers stop.
#[derive(Debug)]
pub struct SigintGuard {
    _private: (),
}

impl SigintGuard {
    /// Start ignoring SIGINT
    pub fn ignore() -> Result<Self> {
        let mut state = suppression();
        if state.guards == 0 {
            // SAFETY: SIG_IGN installs no handler code.
            state.previous = unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) }
                .map_err(|errno| DebugError::Signal(errno.into()))?;
        }
        state.guards += 1;
        Ok(Self { _private: () })
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        let mut state = suppression();
        state.guards = state.guards.saturating_sub(1);
        if state.guards > 0 {
            return;
        }
        // SAFETY: restores the disposition that was installed before.
        if let Err(e) = unsafe { signal(Signal::SIGINT, state.previous) } {
            log::warn!("failed to restore SIGINT handler: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Current SIGINT disposition
    fn current() -> SigHandler {
        // SAFETY: re-installs the disposition that was just read back.
        unsafe {
            let current = signal(Signal::SIGINT, SigHandler::SigDfl).unwrap();
            signal(Signal::SIGINT, current).unwrap();
            current
        }
    }

    #[test]
    fn test_guard_restores_previous_handler() {
        let _lock = crate::tests::SIGNAL_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let before = current();

        let guard = SigintGuard::ignore().unwrap();
        assert_eq!(current(), SigHandler::SigIgn);
        drop(guard);

        assert_eq!(current(), before);
    }

    #[test]
    fn test_overlapping_guards_released_out_of_order() {
        let _lock = crate::tests::SIGNAL_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let before = current();

        let first = SigintGuard::ignore().unwrap();
        let second = SigintGuard::ignore().unwrap();
        drop(first);
        assert_eq!(current(), SigHandler::SigIgn);
        drop(second);

        assert_eq!(current(), before);
    }
}
