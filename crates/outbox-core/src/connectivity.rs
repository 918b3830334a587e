//! Connectivity observation
//!
//! The engine never reads a platform network API; it consumes a
//! [`ConnectivityProbe`] that platform adapters keep up to date, and the
//! [`ConnectivityMonitor`] turns the probe's level into edge transitions so
//! a reconnect can trigger a dispatch pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Trait for platform connectivity signals
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the platform currently reports a usable network
    fn is_online(&self) -> bool;
}

/// Probe backed by a shared flag, toggled by platform adapters
#[derive(Debug)]
pub struct SharedProbe {
    online: AtomicBool,
}

impl SharedProbe {
    /// Create a probe with an initial state
    #[must_use]
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
        })
    }

    /// Record a platform connectivity change
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for SharedProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Edge observed between two connectivity polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Offline on the previous poll, online now
    Reconnected,
    /// Online on the previous poll, offline now
    Disconnected,
    /// Same state as the previous poll
    Unchanged,
}

/// Tracks online/offline transitions from a probe
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    last_online: AtomicBool,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the probe's current state
    #[must_use]
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let last_online = AtomicBool::new(probe.is_online());
        Self { probe, last_online }
    }

    /// Current connectivity level
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.probe.is_online()
    }

    /// Compare the probe against the last observed state and record it
    pub fn poll(&self) -> Transition {
        let online = self.probe.is_online();
        let was_online = self.last_online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (false, true) => Transition::Reconnected,
            (true, false) => Transition::Disconnected,
            _ => Transition::Unchanged,
        }
    }
}
