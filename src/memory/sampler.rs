// Memory sampling

use crate::errors::{GuardError, Result};
use chrono::{DateTime, Utc};
use psutil::process::Process;
use serde::{Deserialize, Serialize};

/// One point-in-time reading of process memory counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,

    /// Bytes currently in use by the process
    pub heap_used: u64,

    /// Bytes available to the process before it hits the host ceiling
    pub heap_total: u64,

    /// Resident set size in bytes
    pub resident_set_size: u64,

    /// Bytes held outside the main heap (mapped buffers, caches)
    pub auxiliary_buffer_bytes: u64,
}

impl MemorySample {
    /// Build a sample stamped with the current time
    pub fn now(heap_used: u64, heap_total: u64, resident_set_size: u64, auxiliary: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            heap_used,
            heap_total,
            resident_set_size,
            auxiliary_buffer_bytes: auxiliary,
        }
    }
}

/// Source of raw memory counters.
pub trait MemorySampler: Send + Sync {
    /// Read the current counters
    fn sample(&self) -> Result<MemorySample>;
}

/// Samples the current process through psutil.
///
/// `heap_used` is the resident set size and `heap_total` is the host's total
/// physical memory. Virtual size beyond RSS is reported as auxiliary bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSampler;

impl ProcessSampler {
    /// Create a new process sampler
    pub fn new() -> Self {
        Self
    }
}

impl MemorySampler for ProcessSampler {
    fn sample(&self) -> Result<MemorySample> {
        let process =
            Process::current().map_err(|e| GuardError::Sampling(format!("process access: {e}")))?;
        let info = process
            .memory_info()
            .map_err(|e| GuardError::Sampling(format!("memory info: {e}")))?;
        let total = psutil::memory::virtual_memory()
            .map(|mem| mem.total())
            .map_err(|e| GuardError::Sampling(format!("virtual memory: {e}")))?;

        let rss = info.rss();
        Ok(MemorySample::now(
            rss,
            total,
            rss,
            info.vms().saturating_sub(rss),
        ))
    }
}
