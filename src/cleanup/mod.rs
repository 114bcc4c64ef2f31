// Cleanup strategies
//
// *Le Nettoyage* (The Cleanup) - Pluggable, prioritized memory reclamation

mod registry;
/// Built-in strategies.
pub mod strategies;

pub use registry::CleanupRegistry;

use crate::memory::{MemoryStatus, ThresholdTier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How aggressive a cleanup run should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    /// Flush cheap-to-rebuild caches only
    Lightweight,
    /// Flush everything that can be flushed
    Deep,
}

/// What asked for the cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Monitor tick crossed a threshold
    Threshold(ThresholdTier),
    /// Usage over the hard limit during preflight
    LimitExceeded,
    /// Explicit request
    Manual,
}

/// Input handed to every strategy.
#[derive(Debug, Clone)]
pub struct CleanupContext {
    /// Requested depth
    pub mode: CleanupMode,

    /// Why the cleanup runs
    pub trigger: CleanupTrigger,

    /// Memory status at the time of the request, when known
    pub status: Option<MemoryStatus>,
}

impl CleanupContext {
    /// Create a context without a status
    pub fn new(mode: CleanupMode, trigger: CleanupTrigger) -> Self {
        Self {
            mode,
            trigger,
            status: None,
        }
    }

    /// Attach the memory status that triggered the request
    pub fn with_status(mut self, status: MemoryStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether a deep cleanup was requested
    pub fn is_deep(&self) -> bool {
        self.mode == CleanupMode::Deep
    }
}

/// What one strategy reports on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyReport {
    /// Names of the things that were cleaned
    pub targets: Vec<String>,

    /// Approximate bytes released
    pub bytes_freed: u64,
}

impl StrategyReport {
    /// Report a single cleaned target
    pub fn single(target: impl Into<String>, bytes_freed: u64) -> Self {
        Self {
            targets: vec![target.into()],
            bytes_freed,
        }
    }
}

/// Outcome of one strategy inside a cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    /// Strategy name
    pub name: String,

    /// Whether the strategy succeeded
    pub success: bool,

    /// Targets cleaned (empty on failure)
    pub targets: Vec<String>,

    /// Bytes released (zero on failure)
    pub bytes_freed: u64,

    /// Wall time spent in the strategy
    pub duration_ms: u64,

    /// Failure description
    pub error: Option<String>,
}

/// Aggregate result of a cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    /// True iff no strategy failed
    pub success: bool,

    /// Union of the successful strategies' targets
    pub cleaned_targets: BTreeSet<String>,

    /// Sum of bytes released by successful strategies
    pub bytes_freed: u64,

    /// Wall time of the whole run
    pub duration_ms: u64,

    /// Combined message naming each failed strategy
    pub error: Option<String>,

    /// Per-strategy outcomes in execution order
    pub breakdown: Vec<StrategyOutcome>,

    /// Depth of the run
    pub mode: CleanupMode,

    /// True when this result was shared from a concurrent run
    pub coalesced: bool,
}

impl CleanupResult {
    /// Aggregate per-strategy outcomes
    pub fn from_outcomes(outcomes: Vec<StrategyOutcome>, mode: CleanupMode, duration_ms: u64) -> Self {
        let mut cleaned_targets = BTreeSet::new();
        let mut bytes_freed = 0u64;
        let mut failures = Vec::new();

        for outcome in &outcomes {
            if outcome.success {
                cleaned_targets.extend(outcome.targets.iter().cloned());
                bytes_freed = bytes_freed.saturating_add(outcome.bytes_freed);
            } else {
                failures.push(format!(
                    "{}: {}",
                    outcome.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        Self {
            success: failures.is_empty(),
            cleaned_targets,
            bytes_freed,
            duration_ms,
            error: (!failures.is_empty()).then(|| failures.join("; ")),
            breakdown: outcomes,
            mode,
            coalesced: false,
        }
    }

    /// Names of the strategies that failed
    pub fn failed_strategies(&self) -> Vec<String> {
        self.breakdown
            .iter()
            .filter(|outcome| !outcome.success)
            .map(|outcome| outcome.name.clone())
            .collect()
    }
}

/// A memory reclamation strategy registered with the [`CleanupRegistry`].
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    /// Unique name
    fn name(&self) -> &str;

    /// Lower values run earlier
    fn priority(&self) -> i32;

    /// Whether the strategy can run at all in this process
    fn is_available(&self) -> bool {
        true
    }

    /// Whether the strategy should run for this request
    fn is_applicable(&self, ctx: &CleanupContext) -> bool;

    /// Bytes the strategy expects to release
    fn estimate_impact(&self, ctx: &CleanupContext) -> anyhow::Result<u64>;

    /// Release memory
    async fn cleanup(&self, ctx: &CleanupContext) -> anyhow::Result<StrategyReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, success: bool, bytes: u64) -> StrategyOutcome {
        StrategyOutcome {
            name: name.to_string(),
            success,
            targets: if success { vec![format!("{name}-target")] } else { vec![] },
            bytes_freed: if success { bytes } else { 0 },
            duration_ms: 1,
            error: (!success).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn test_aggregate_counts_only_successes() {
        let result = CleanupResult::from_outcomes(
            vec![outcome("a", false, 100), outcome("b", true, 20), outcome("c", true, 30)],
            CleanupMode::Lightweight,
            5,
        );
        assert!(!result.success);
        assert_eq!(result.bytes_freed, 50);
        assert_eq!(result.cleaned_targets.len(), 2);
        assert_eq!(result.error.as_deref(), Some("a: boom"));
        assert_eq!(result.failed_strategies(), vec!["a".to_string()]);
    }

    #[test]
    fn test_empty_run_is_success() {
        let result = CleanupResult::from_outcomes(Vec::new(), CleanupMode::Deep, 0);
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.bytes_freed, 0);
    }
}
