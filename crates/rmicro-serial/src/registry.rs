//! Registry of open serial ports
//!
//! A serial device left open when the process dies can wedge some OS
//! drivers. Every [`SerialTransport`](crate::SerialTransport) registers its
//! port here while open, so an exit hook can close whatever is left.

use serialport::SerialPort;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, OnceLock, TryLockError};

/// Serial port shared between a transport and the registry
///
/// `None` once closed.
pub(crate) type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// Identifies a registered port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

struct Entry {
    id: PortId,
    device: String,
    slot: PortSlot,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Set of currently open serial ports
#[derive(Default)]
pub struct PortRegistry {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

static GLOBAL: OnceLock<Arc<PortRegistry>> = OnceLock::new();

impl PortRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by transports unless told otherwise
    pub fn global() -> Arc<PortRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(PortRegistry::new())))
    }

    pub(crate) fn add(&self, device: &str, slot: PortSlot) -> PortId {
        let id = PortId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push(Entry {
            id,
            device: device.to_string(),
            slot,
        });
        id
    }

    /// Forget a port without closing it
    pub fn remove(&self, id: PortId) {
        lock(&self.entries).retain(|entry| entry.id != id);
    }

    /// Number of registered ports
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no port is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Devices of the registered ports
    pub fn devices(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|entry| entry.device.clone())
            .collect()
    }

    /// Close every registered port and empty the registry
    ///
    /// Ports already closed by their transport are skipped. A port whose
    /// transport is in the middle of an I/O call is left to that transport.
    /// Returns the number of ports closed.
    pub fn close_all(&self) -> usize {
        let entries = std::mem::take(&mut *lock(&self.entries));
        let mut closed = 0;

        for entry in entries {
            let mut slot = match entry.slot.try_lock() {
                Ok(slot) => slot,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    log::warn!("{}: busy, not closing", entry.device);
                    continue;
                }
            };
            if slot.take().is_some() {
                log::debug!("{}: closed by registry", entry.device);
                closed += 1;
            }
        }

        closed
    }
}

extern "C" fn close_global_ports() {
    if let Some(registry) = GLOBAL.get() {
        let closed = registry.close_all();
        if closed > 0 {
            log::warn!("closed {} serial port(s) left open at exit", closed);
        }
    }
}

/// Close every port in the global registry when the process exits
///
/// Installing more than once has no further effect.
pub fn install_exit_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // SAFETY: close_global_ports is a plain extern "C" fn with no
        // arguments and does not unwind.
        let rc = unsafe { libc::atexit(close_global_ports) };
        if rc != 0 {
            log::warn!("failed to register serial port exit hook");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let registry = PortRegistry::new();
        let a = registry.add("/dev/ttyACM0", PortSlot::default());
        let b = registry.add("/dev/ttyACM1", PortSlot::default());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.remove(a);
        assert_eq!(registry.devices(), ["/dev/ttyACM1"]);
        registry.remove(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_close_all_tolerates_closed_ports() {
        let registry = PortRegistry::new();
        registry.add("/dev/ttyACM0", PortSlot::default());
        registry.add("/dev/ttyACM1", PortSlot::default());

        assert_eq!(registry.close_all(), 0);
        assert!(registry.is_empty());
        assert_eq!(registry.close_all(), 0);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(PortRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let id = registry.add(&format!("/dev/ttyUSB{}", i), PortSlot::default());
                    if i % 2 == 0 {
                        registry.remove(id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_exit_hook_installs_once() {
        install_exit_hook();
        install_exit_hook();
        assert!(Arc::ptr_eq(&PortRegistry::global(), &PortRegistry::global()));
    }
}
