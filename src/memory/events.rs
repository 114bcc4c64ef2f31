use super::status::{MemoryStatus, PressureLevel, ThresholdTier};
use crate::cleanup::CleanupResult;
use crate::errors::ErrorReport;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Events emitted by the memory monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Pressure level changed between two samples
    Pressure {
        /// Level before this sample
        previous: PressureLevel,
        /// Level now
        current: PressureLevel,
        /// Status at this sample
        status: MemoryStatus,
    },

    /// A tier-triggered cleanup finished
    Cleanup {
        /// Tier that triggered it
        tier: ThresholdTier,
        /// Registry result, absent for reclaim-only cleanups
        result: Option<CleanupResult>,
        /// Reclaimer passes performed
        gc_passes: u32,
    },

    /// A non-throwing error report
    ErrorReport(ErrorReport),

    /// Usage is still over the hard limit after cleanup
    LimitExceeded {
        /// Status after cleanup
        status: MemoryStatus,
    },
}

/// Listener callback type.
pub type MonitorListener = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

/// Handle returned on subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener set with panic isolation.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, MonitorListener)>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self, listener: MonitorListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener.
    ///
    /// The list is copied first so listeners may (un)subscribe from inside the
    /// callback. A panicking listener is logged and skipped.
    pub fn emit(&self, event: &MonitorEvent) {
        let listeners: Vec<(ListenerId, MonitorListener)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(listener = id.0, "Memory monitor listener panicked; continuing");
            }
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
