//! rmicro-dummy - In-memory transport and debugger for testing
//!
//! [`DummyTransport`] behaves like a device that echoes (or swallows)
//! what it is sent, with knobs for the failure modes real backends have:
//! refusing to open, accepting only part of a write, and running out of
//! data. [`DummyDebugger`] records its lifecycle. Both hand out a monitor
//! that stays usable after the double has been moved into a wrapper.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use rmicro_core::debugger::Debugger;
use rmicro_core::error::{Error, Result};
use rmicro_core::transport::Transport;

/// Configuration for the dummy transport
#[derive(Debug, Clone, Default)]
pub struct DummyConfig {
    /// Queue every written byte for reading back
    pub loopback: bool,
    /// Make `open` fail
    pub fail_open: bool,
    /// Accept at most this many bytes per write
    pub max_write_chunk: Option<usize>,
    /// Bytes available to read right after opening
    pub initial_rx: Vec<u8>,
}

#[derive(Debug, Default)]
struct TransportState {
    open: bool,
    opens: usize,
    closes: usize,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport
///
/// Reading past the queued data is end of stream: `read` returns what is
/// left, possibly nothing.
#[derive(Debug)]
pub struct DummyTransport {
    config: DummyConfig,
    state: Arc<Mutex<TransportState>>,
}

impl DummyTransport {
    /// Create a dummy transport with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// Create a loopback transport
    pub fn loopback() -> Self {
        Self::new(DummyConfig {
            loopback: true,
            ..DummyConfig::default()
        })
    }

    /// Handle for inspecting and feeding the transport from outside
    pub fn monitor(&self) -> DummyMonitor {
        DummyMonitor {
            state: Arc::clone(&self.state),
        }
    }
}

impl Transport for DummyTransport {
    fn open(&mut self) -> Result<()> {
        if self.config.fail_open {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "dummy transport configured to fail open",
            )));
        }

        let mut state = lock(&self.state);
        if state.open {
            return Err(Error::AlreadyOpen("dummy".into()));
        }
        state.open = true;
        state.opens += 1;
        state.rx.extend(self.config.initial_rx.iter().copied());
        log::debug!("dummy: opened");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            state.open = false;
            state.closes += 1;
            log::debug!("dummy: closed");
        }
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(Error::NotOpen("dummy".into()));
        }
        let count = n.min(state.rx.len());
        Ok(state.rx.drain(..count).collect())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(Error::NotOpen("dummy".into()));
        }
        let count = self
            .config
            .max_write_chunk
            .map_or(data.len(), |chunk| chunk.min(data.len()));
        let accepted = &data[..count];
        state.tx.extend_from_slice(accepted);
        if self.config.loopback {
            state.rx.extend(accepted.iter().copied());
        }
        Ok(count)
    }
}

/// Shared view of a [`DummyTransport`]
#[derive(Debug, Clone)]
pub struct DummyMonitor {
    state: Arc<Mutex<TransportState>>,
}

impl DummyMonitor {
    /// Whether the transport is currently open
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    /// Number of closes that released the transport
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    /// Every byte accepted by `write` so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).tx.clone()
    }

    /// Queue bytes for the next reads
    pub fn push_rx(&self, data: &[u8]) {
        lock(&self.state).rx.extend(data.iter().copied());
    }
}

#[derive(Debug, Default)]
struct DebuggerState {
    running: bool,
    starts: usize,
    stops: usize,
}

/// Debugger that only records its lifecycle
#[derive(Debug, Default)]
pub struct DummyDebugger {
    fail_start: bool,
    state: Arc<Mutex<DebuggerState>>,
}

impl DummyDebugger {
    /// Create a dummy debugger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dummy debugger whose `start` fails
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Handle for inspecting the debugger from outside
    pub fn monitor(&self) -> DebuggerMonitor {
        DebuggerMonitor {
            state: Arc::clone(&self.state),
        }
    }
}

impl Debugger for DummyDebugger {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(Error::Spawn {
                command: "dummy-debugger".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "configured to fail"),
            });
        }
        let mut state = lock(&self.state);
        if state.running {
            return Err(Error::AlreadyRunning("dummy-debugger".into()));
        }
        state.running = true;
        state.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.running {
            state.running = false;
            state.stops += 1;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

/// Shared view of a [`DummyDebugger`]
#[derive(Debug, Clone)]
pub struct DebuggerMonitor {
    state: Arc<Mutex<DebuggerState>>,
}

impl DebuggerMonitor {
    /// Whether the debugger is running
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Number of successful starts
    pub fn starts(&self) -> usize {
        lock(&self.state).starts
    }

    /// Number of stops that ended a running session
    pub fn stops(&self) -> usize {
        lock(&self.state).stops
    }
}
