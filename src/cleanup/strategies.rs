// Built-in cleanup strategies

use super::{CleanupContext, CleanupMode, CleanupStrategy, StrategyReport};
use crate::cache::FlushableCache;
use crate::memory::{MemoryHistory, MemorySample};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Priority of the detection-cache flush
pub const DETECTION_CACHE_PRIORITY: i32 = 10;

/// Priority of the parse-cache flush
pub const PARSE_CACHE_PRIORITY: i32 = 20;

/// Priority of the auxiliary-cache hook
pub const AUXILIARY_CACHE_PRIORITY: i32 = 30;

/// Priority of the history trim
pub const HISTORY_TRIM_PRIORITY: i32 = 40;

/// Flushes a [`FlushableCache`].
pub struct CacheFlushStrategy {
    name: String,
    priority: i32,
    min_mode: CleanupMode,
    cache: Arc<dyn FlushableCache>,
}

impl CacheFlushStrategy {
    /// Flush a cache on every cleanup
    pub fn new(name: impl Into<String>, priority: i32, cache: Arc<dyn FlushableCache>) -> Self {
        Self {
            name: name.into(),
            priority,
            min_mode: CleanupMode::Lightweight,
            cache,
        }
    }

    /// Flush the cached detection results
    pub fn detection_cache(cache: Arc<dyn FlushableCache>) -> Self {
        Self::new("detection-cache", DETECTION_CACHE_PRIORITY, cache)
    }

    /// Flush the cached parse trees
    pub fn parse_cache(cache: Arc<dyn FlushableCache>) -> Self {
        Self::new("parse-cache", PARSE_CACHE_PRIORITY, cache)
    }

    /// Only run on deep cleanups
    pub fn deep_only(mut self) -> Self {
        self.min_mode = CleanupMode::Deep;
        self
    }
}

#[async_trait]
impl CleanupStrategy for CacheFlushStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_applicable(&self, ctx: &CleanupContext) -> bool {
        ctx.mode >= self.min_mode
    }

    fn estimate_impact(&self, _ctx: &CleanupContext) -> anyhow::Result<u64> {
        Ok(self.cache.approx_bytes())
    }

    async fn cleanup(&self, _ctx: &CleanupContext) -> anyhow::Result<StrategyReport> {
        let (entries, bytes) = self.cache.flush();
        debug!(cache = %self.cache.name(), entries, bytes, "Flushed cache");
        Ok(StrategyReport::single(self.cache.name(), bytes))
    }
}

/// Drops all but the newest samples from the monitor history. Deep cleanups only.
pub struct HistoryTrimCleanup {
    history: Arc<MemoryHistory>,
    keep: usize,
}

impl HistoryTrimCleanup {
    /// Keep the newest `keep` samples
    pub fn new(history: Arc<MemoryHistory>, keep: usize) -> Self {
        Self { history, keep }
    }
}

#[async_trait]
impl CleanupStrategy for HistoryTrimCleanup {
    fn name(&self) -> &str {
        "memory-history"
    }

    fn priority(&self) -> i32 {
        HISTORY_TRIM_PRIORITY
    }

    fn is_applicable(&self, ctx: &CleanupContext) -> bool {
        ctx.is_deep()
    }

    fn estimate_impact(&self, _ctx: &CleanupContext) -> anyhow::Result<u64> {
        let excess = self.history.len().saturating_sub(self.keep);
        Ok((excess * std::mem::size_of::<MemorySample>()) as u64)
    }

    async fn cleanup(&self, _ctx: &CleanupContext) -> anyhow::Result<StrategyReport> {
        let removed = self.history.trim_to(self.keep);
        Ok(StrategyReport::single(
            "memory-history",
            (removed * std::mem::size_of::<MemorySample>()) as u64,
        ))
    }
}

/// Hook flushing a cache owned outside this crate (embeddings, vector store).
///
/// The hook returns the number of bytes it released.
pub type FlushHook = Arc<dyn Fn(CleanupMode) -> anyhow::Result<u64> + Send + Sync>;

/// Runs an externally supplied flush hook.
pub struct AuxiliaryCacheFlush {
    name: String,
    hook: FlushHook,
    estimate: Option<Arc<dyn Fn() -> u64 + Send + Sync>>,
}

impl AuxiliaryCacheFlush {
    /// Wrap a flush hook under a strategy name
    pub fn new(name: impl Into<String>, hook: FlushHook) -> Self {
        Self {
            name: name.into(),
            hook,
            estimate: None,
        }
    }

    /// Provide an impact estimate for the hook
    pub fn with_estimate(mut self, estimate: Arc<dyn Fn() -> u64 + Send + Sync>) -> Self {
        self.estimate = Some(estimate);
        self
    }
}

#[async_trait]
impl CleanupStrategy for AuxiliaryCacheFlush {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        AUXILIARY_CACHE_PRIORITY
    }

    fn is_applicable(&self, _ctx: &CleanupContext) -> bool {
        true
    }

    fn estimate_impact(&self, _ctx: &CleanupContext) -> anyhow::Result<u64> {
        Ok(self.estimate.as_ref().map_or(0, |estimate| estimate()))
    }

    async fn cleanup(&self, ctx: &CleanupContext) -> anyhow::Result<StrategyReport> {
        let bytes = (self.hook)(ctx.mode)?;
        Ok(StrategyReport::single(self.name.clone(), bytes))
    }
}
