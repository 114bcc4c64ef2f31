use super::types::DegradationNotice;
use crate::memory::MemoryStatus;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::warn;

/// Process-wide load-shedding signal.
///
/// Observers hold a [`watch::Receiver`] and see the latest notice; nothing is
/// queued, so slow observers only ever miss intermediate notices.
#[derive(Debug)]
pub struct DegradationSignal {
    sender: watch::Sender<Option<DegradationNotice>>,
    sequence: AtomicU64,
}

impl Default for DegradationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradationSignal {
    /// Create a signal with no notice published
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a notice to every current and future observer
    pub fn publish(&self, reason: impl Into<String>, status: Option<MemoryStatus>) -> DegradationNotice {
        let notice = DegradationNotice {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            reason: reason.into(),
            status,
            timestamp: Utc::now(),
        };
        warn!(
            sequence = notice.sequence,
            reason = %notice.reason,
            "Graceful degradation requested"
        );
        self.sender.send_replace(Some(notice.clone()));
        notice
    }

    /// Observe notices
    pub fn subscribe(&self) -> watch::Receiver<Option<DegradationNotice>> {
        self.sender.subscribe()
    }

    /// Notices published so far
    pub fn count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Latest notice
    pub fn latest(&self) -> Option<DegradationNotice> {
        self.sender.borrow().clone()
    }
}
