use crate::chunk::{Chunk, EMERGENCY_TAG};
use crate::memory::MemoryStatus;
use crate::selector::ProcessingTier;
use crate::threshold::ErrorWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What sent a unit down the fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackTrigger {
    /// Usage was over the hard limit at preflight
    MemoryLimit {
        /// Bytes in use
        heap_used: u64,
        /// Configured limit
        limit_bytes: u64,
    },

    /// The error threshold was open at preflight
    CircuitOpen {
        /// Errors in the current window
        errors: u32,
        /// Errors at which the breaker trips
        max_errors: u32,
    },

    /// Detection failed or timed out
    DetectionFailed {
        /// Error text
        message: String,
    },

    /// The selected tier failed, timed out or panicked
    ExecutionFailed {
        /// Tier that failed
        tier: ProcessingTier,
        /// Error text
        message: String,
    },

    /// The pipeline itself panicked
    Panic {
        /// Panic payload, when it was a string
        message: String,
    },
}

impl fmt::Display for FallbackTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackTrigger::MemoryLimit {
                heap_used,
                limit_bytes,
            } => write!(f, "memory limit exceeded ({heap_used} > {limit_bytes} bytes)"),
            FallbackTrigger::CircuitOpen { errors, max_errors } => {
                write!(f, "error threshold open ({errors}/{max_errors})")
            }
            FallbackTrigger::DetectionFailed { message } => write!(f, "detection failed: {message}"),
            FallbackTrigger::ExecutionFailed { tier, message } => {
                write!(f, "{tier} failed: {message}")
            }
            FallbackTrigger::Panic { message } => write!(f, "panic: {message}"),
        }
    }
}

/// Why a result is degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackReason {
    /// What started the fallback
    pub trigger: FallbackTrigger,

    /// Why the cascade itself failed, for emergency results
    pub fallback_error: Option<String>,
}

impl FallbackReason {
    pub(crate) fn new(trigger: FallbackTrigger) -> Self {
        Self {
            trigger,
            fallback_error: None,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.trigger)?;
        if let Some(error) = &self.fallback_error {
            write!(f, "; fallback failed: {error}")?;
        }
        Ok(())
    }
}

/// Result of processing one unit. Always carries at least one chunk for
/// non-empty input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Unit path
    pub path: PathBuf,

    /// Produced chunks
    pub chunks: Vec<Chunk>,

    /// Tier that produced the chunks; absent for emergency and empty results
    pub tier_used: Option<ProcessingTier>,

    /// Set whenever the primary path did not produce the chunks
    pub fallback_reason: Option<FallbackReason>,

    /// Wall time
    pub duration_ms: u64,

    /// Whether the primary path succeeded
    pub success: bool,
}

impl ProcessingResult {
    /// Whether the result is the single last-resort chunk
    pub fn is_emergency(&self) -> bool {
        self.chunks.len() == 1 && self.chunks[0].has_tag(EMERGENCY_TAG)
    }

    /// Number of chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Published on the degradation channel when the guard sheds load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationNotice {
    /// Monotonic notice number, starting at 1
    pub sequence: u64,

    /// Why degradation was requested
    pub reason: String,

    /// Memory status at the time, when known
    pub status: Option<MemoryStatus>,

    /// When the notice was published
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardStatus {
    /// Circuit breaker window
    pub error_window: ErrorWindow,

    /// Memory status, defaulted when sampling fails
    pub memory: MemoryStatus,

    /// Whether `initialize` has run without a matching `destroy`
    pub is_initialized: bool,

    /// Whether the sampling task is running
    pub is_monitoring: bool,

    /// Degradation notices published so far
    pub degradations: u64,

    /// Registered cleanup strategies in execution order
    pub cleanup_strategies: Vec<String>,
}
