use super::sampler::MemorySample;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Bounded FIFO buffer of memory samples.
///
/// Shared between the monitor and the history-trim cleanup strategy, so it
/// carries its own lock.
#[derive(Debug)]
pub struct MemoryHistory {
    samples: Mutex<VecDeque<MemorySample>>,
    capacity: usize,
}

impl MemoryHistory {
    /// Create a history holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once over capacity
    pub fn push(&self, sample: MemorySample) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Copy of all samples, oldest first
    pub fn snapshot(&self) -> Vec<MemorySample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    /// Copy of the newest `n` samples, oldest first
    pub fn recent(&self, n: usize) -> Vec<MemorySample> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).copied().collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<MemorySample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .copied()
    }

    /// Drop everything but the newest `keep` samples, returning how many were removed
    pub fn trim_to(&self, keep: usize) -> usize {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = samples.len().saturating_sub(keep);
        samples.drain(..removed);
        removed
    }

    /// Remove every sample
    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate heap footprint of the buffer
    pub fn approx_bytes(&self) -> u64 {
        (self.len() * std::mem::size_of::<MemorySample>()) as u64
    }
}
