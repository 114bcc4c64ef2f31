use super::events::{ListenerId, ListenerSet, MonitorEvent, MonitorListener};
use super::history::MemoryHistory;
use super::reclaim::Reclaimer;
use super::sampler::{MemorySample, MemorySampler};
use super::status::{MemoryStatus, PressureLevel, ThresholdTier, TREND_WINDOW};
use crate::cleanup::{CleanupContext, CleanupMode, CleanupRegistry, CleanupResult, CleanupTrigger};
use crate::config::MonitorConfig;
use crate::errors::{ErrorReport, GuardError, Result, Severity};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a tick did about the tier it observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TierAction {
    /// Usage below the warning threshold
    None,
    /// A cleanup was due but the cooldown had not elapsed
    CooldownActive,
    /// Cleanup ran
    Cleaned {
        /// Registry result, absent for reclaim-only cleanups
        result: Option<CleanupResult>,
        /// Reclaimer passes performed
        gc_passes: u32,
    },
}

/// Outcome of one monitor tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Status at the start of the tick
    pub status: MemoryStatus,
    /// Tier the status fell in
    pub tier: ThresholdTier,
    /// Action taken
    pub action: TierAction,
}

/// Aggregated monitor statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Samples currently held in history
    pub sample_count: usize,
    /// Highest `heap_used` in history
    pub peak_heap_used: u64,
    /// Mean `heap_used` over history
    pub average_heap_used: u64,
    /// Most recent sample
    pub latest: Option<MemorySample>,
    /// Tier-triggered cleanups performed
    pub cleanup_count: u64,
    /// Reclaimer passes performed
    pub gc_count: u64,
    /// Current adaptive sampling interval
    pub current_interval_ms: u64,
    /// Configured hard limit
    pub memory_limit_bytes: Option<u64>,
    /// Result of the last registry cleanup
    pub last_cleanup: Option<CleanupResult>,
    /// Whether the sampling task is running
    pub is_monitoring: bool,
}

struct MonitorState {
    memory_limit_bytes: Option<u64>,
    last_cleanup_at: Option<Instant>,
    last_cleanup: Option<CleanupResult>,
    last_level: PressureLevel,
    idle_streak: u32,
    current_interval: Duration,
    cleanup_count: u64,
    gc_count: u64,
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Adaptive memory monitor.
///
/// Each tick takes one sample, derives a [`MemoryStatus`] and runs the cleanup
/// tier that status falls in. Warning reclaims only, critical adds a
/// lightweight registry cleanup, emergency a deep one plus several reclaim
/// passes and a fatal [`ErrorReport`].
pub struct MemoryMonitor {
    config: MonitorConfig,
    sampler: Arc<dyn MemorySampler>,
    history: Arc<MemoryHistory>,
    registry: Arc<CleanupRegistry>,
    reclaimer: Arc<dyn Reclaimer>,
    listeners: ListenerSet,
    state: Mutex<MonitorState>,
    task: Mutex<Option<MonitorTask>>,
}

impl MemoryMonitor {
    /// Create a monitor; fails on invalid configuration
    pub fn new(
        config: MonitorConfig,
        sampler: Arc<dyn MemorySampler>,
        reclaimer: Arc<dyn Reclaimer>,
        registry: Arc<CleanupRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let state = MonitorState {
            memory_limit_bytes: config.memory_limit_bytes(),
            last_cleanup_at: None,
            last_cleanup: None,
            last_level: PressureLevel::Low,
            idle_streak: 0,
            current_interval: config.check_interval(),
            cleanup_count: 0,
            gc_count: 0,
        };

        Ok(Self {
            history: Arc::new(MemoryHistory::new(config.max_history_size)),
            config,
            sampler,
            registry,
            reclaimer,
            listeners: ListenerSet::new(),
            state: Mutex::new(state),
            task: Mutex::new(None),
        })
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Shared handle to the sample history
    pub fn history_handle(&self) -> Arc<MemoryHistory> {
        self.history.clone()
    }

    /// Take a sample, record it and return the derived status.
    pub fn check_usage(&self) -> Result<MemoryStatus> {
        let sample = self.sampler.sample()?;
        self.history.push(sample);
        let status = self.derive(&sample);

        let pressure_change = {
            let mut state = self.lock_state();
            self.adapt_interval(&mut state, status.usage_ratio);
            let previous = state.last_level;
            state.last_level = status.pressure_level;
            (previous != status.pressure_level).then_some(previous)
        };

        if let Some(previous) = pressure_change {
            debug!(?previous, current = ?status.pressure_level, "Memory pressure changed");
            self.listeners.emit(&MonitorEvent::Pressure {
                previous,
                current: status.pressure_level,
                status: status.clone(),
            });
        }

        Ok(status)
    }

    /// Status from a fresh sample without recording it in history
    pub fn peek_usage(&self) -> Result<MemoryStatus> {
        let sample = self.sampler.sample()?;
        Ok(self.derive(&sample))
    }

    /// One monitoring step: sample, then clean up according to the tier.
    pub async fn tick(&self) -> Result<TickReport> {
        let status = self.check_usage()?;
        let tier = status.tier(&self.config);
        let action = self.run_tier(tier, &status).await;

        if !status.is_within_limit {
            let after = match action {
                TierAction::Cleaned { .. } => self.peek_usage().unwrap_or_else(|_| status.clone()),
                _ => status.clone(),
            };
            if !after.is_within_limit {
                warn!(
                    heap_used = after.heap_used,
                    limit = ?after.memory_limit_bytes,
                    "Memory still over limit after cleanup"
                );
                self.listeners.emit(&MonitorEvent::LimitExceeded { status: after });
            }
        }

        Ok(TickReport {
            status,
            tier,
            action,
        })
    }

    async fn run_tier(&self, tier: ThresholdTier, status: &MemoryStatus) -> TierAction {
        let required = match tier {
            ThresholdTier::Normal => return TierAction::None,
            ThresholdTier::Warning => self.config.cleanup_cooldown(),
            ThresholdTier::Critical => self.config.cleanup_cooldown() / 2,
            ThresholdTier::Emergency => Duration::ZERO,
        };

        let last = self.lock_state().last_cleanup_at;
        if let Some(last) = last {
            if last.elapsed() < required {
                debug!(?tier, "Cleanup skipped; cooldown active");
                return TierAction::CooldownActive;
            }
        }

        let ctx_for = |mode| {
            CleanupContext::new(mode, CleanupTrigger::Threshold(tier)).with_status(status.clone())
        };

        let (result, gc_passes) = match tier {
            ThresholdTier::Normal => return TierAction::None,
            ThresholdTier::Warning => (None, self.reclaim(1)),
            ThresholdTier::Critical => {
                let result = self.registry.perform_cleanup(&ctx_for(CleanupMode::Lightweight)).await;
                (Some(result), self.reclaim(1))
            }
            ThresholdTier::Emergency => {
                let result = self.registry.perform_cleanup(&ctx_for(CleanupMode::Deep)).await;
                let passes = self.reclaim(self.config.emergency_gc_passes.max(1));

                let report = ErrorReport::new(
                    Severity::Fatal,
                    format!(
                        "Memory usage at {:.1}% crossed the emergency threshold ({:.0}%)",
                        status.usage_percent,
                        self.config.emergency_threshold * 100.0
                    ),
                    "memory-monitor",
                );
                report.log();
                self.listeners.emit(&MonitorEvent::ErrorReport(report));
                (Some(result), passes)
            }
        };

        {
            let mut state = self.lock_state();
            state.last_cleanup_at = Some(Instant::now());
            state.cleanup_count += 1;
            if let Some(result) = &result {
                state.last_cleanup = Some(result.clone());
            }
        }

        info!(?tier, gc_passes, "Tiered memory cleanup finished");
        self.listeners.emit(&MonitorEvent::Cleanup {
            tier,
            result: result.clone(),
            gc_passes,
        });

        TierAction::Cleaned { result, gc_passes }
    }

    /// Run one reclaimer pass; returns whether memory was handed back
    pub fn force_gc(&self) -> bool {
        if !self.reclaimer.supports_collection() {
            debug!("Reclaimer unsupported on this platform");
            return false;
        }
        let collected = self.reclaimer.collect();
        self.lock_state().gc_count += 1;
        collected
    }

    fn reclaim(&self, passes: u32) -> u32 {
        if !self.reclaimer.supports_collection() {
            return 0;
        }
        for _ in 0..passes {
            self.reclaimer.collect();
        }
        self.lock_state().gc_count += u64::from(passes);
        passes
    }

    /// Start the sampling task on the current tokio runtime.
    ///
    /// Calling this while the task is running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GuardError::NoRuntime(e.to_string()))?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let monitor: Weak<Self> = Arc::downgrade(self);

        let handle = runtime.spawn(async move {
            loop {
                let interval = match monitor.upgrade() {
                    Some(monitor) => monitor.current_interval(),
                    None => break,
                };
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
                let Some(monitor) = monitor.upgrade() else { break };
                if let Err(err) = monitor.tick().await {
                    warn!("Memory monitor tick failed: {err}");
                }
            }
            debug!("Memory monitor task exited");
        });

        info!(interval_ms = self.config.check_interval_ms, "Memory monitoring started");
        *task = Some(MonitorTask { shutdown, handle });
        Ok(())
    }

    /// Stop the sampling task; an in-flight tick runs to completion
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = task.shutdown.send(true);
            info!("Memory monitoring stopped");
        }
    }

    /// Whether the sampling task is running
    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Current adaptive sampling interval
    pub fn current_interval(&self) -> Duration {
        self.lock_state().current_interval
    }

    /// Copy of the sample history, oldest first
    pub fn history(&self) -> Vec<MemorySample> {
        self.history.snapshot()
    }

    /// Drop every recorded sample
    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Set or clear the hard limit in megabytes
    pub fn set_memory_limit(&self, limit_mb: Option<u64>) -> Result<()> {
        if limit_mb == Some(0) {
            return Err(GuardError::config("memory limit must be positive"));
        }
        self.lock_state().memory_limit_bytes = limit_mb.map(|mb| mb.saturating_mul(1024 * 1024));
        info!(?limit_mb, "Memory limit updated");
        Ok(())
    }

    /// Configured hard limit in bytes
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.lock_state().memory_limit_bytes
    }

    /// Aggregate statistics over history and counters
    pub fn stats(&self) -> MemoryStats {
        let samples = self.history.snapshot();
        let peak_heap_used = samples.iter().map(|s| s.heap_used).max().unwrap_or(0);
        let average_heap_used = if samples.is_empty() {
            0
        } else {
            (samples.iter().map(|s| u128::from(s.heap_used)).sum::<u128>() / samples.len() as u128)
                as u64
        };
        let is_monitoring = self.is_monitoring();
        let state = self.lock_state();

        MemoryStats {
            sample_count: samples.len(),
            peak_heap_used,
            average_heap_used,
            latest: samples.last().copied(),
            cleanup_count: state.cleanup_count,
            gc_count: state.gc_count,
            current_interval_ms: state.current_interval.as_millis() as u64,
            memory_limit_bytes: state.memory_limit_bytes,
            last_cleanup: state.last_cleanup.clone(),
            is_monitoring,
        }
    }

    /// Register an event listener
    pub fn subscribe(&self, listener: MonitorListener) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Remove an event listener
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Remove every event listener
    pub fn clear_listeners(&self) {
        self.listeners.clear();
    }

    /// Deliver an event to the listeners
    pub fn emit(&self, event: &MonitorEvent) {
        self.listeners.emit(event);
    }

    fn derive(&self, latest: &MemorySample) -> MemoryStatus {
        let window = self.history.recent(TREND_WINDOW);
        let limit = self.lock_state().memory_limit_bytes;
        MemoryStatus::derive(latest, &window, limit, &self.config)
    }

    fn adapt_interval(&self, state: &mut MonitorState, usage_ratio: f64) {
        let base = self.config.check_interval();
        if usage_ratio < self.config.low_water_mark {
            state.idle_streak += 1;
            if state.idle_streak >= self.config.idle_samples_before_backoff {
                let ceiling = base * self.config.max_interval_multiplier;
                let widened = (state.current_interval * 2).min(ceiling);
                if widened != state.current_interval {
                    debug!(interval_ms = widened.as_millis() as u64, "Widening sampling interval");
                }
                state.current_interval = widened;
                state.idle_streak = 0;
            }
        } else {
            state.idle_streak = 0;
            state.current_interval = base;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("config", &self.config)
            .field("history", &self.history.len())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::{CleanupStrategy, StrategyReport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    /// Reports a configurable `heap_used` out of a fixed total of 1000 bytes.
    struct FixedSampler {
        used: AtomicU64,
    }

    impl FixedSampler {
        fn new(used: u64) -> Arc<Self> {
            Arc::new(Self {
                used: AtomicU64::new(used),
            })
        }

        fn set(&self, used: u64) {
            self.used.store(used, Ordering::SeqCst);
        }
    }

    impl MemorySampler for FixedSampler {
        fn sample(&self) -> Result<MemorySample> {
            let used = self.used.load(Ordering::SeqCst);
            Ok(MemorySample::now(used, 1_000, used, 0))
        }
    }

    struct FailingSampler;

    impl MemorySampler for FailingSampler {
        fn sample(&self) -> Result<MemorySample> {
            Err(GuardError::Sampling("counters unavailable".into()))
        }
    }

    #[derive(Default)]
    struct CountingReclaimer {
        passes: AtomicU32,
    }

    impl Reclaimer for CountingReclaimer {
        fn supports_collection(&self) -> bool {
            true
        }

        fn collect(&self) -> bool {
            self.passes.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct ModeRecorder {
        modes: Arc<Mutex<Vec<CleanupMode>>>,
    }

    #[async_trait]
    impl CleanupStrategy for ModeRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn priority(&self) -> i32 {
            1
        }

        fn is_applicable(&self, _ctx: &CleanupContext) -> bool {
            true
        }

        fn estimate_impact(&self, _ctx: &CleanupContext) -> anyhow::Result<u64> {
            Ok(0)
        }

        async fn cleanup(&self, ctx: &CleanupContext) -> anyhow::Result<StrategyReport> {
            self.modes.lock().unwrap().push(ctx.mode);
            Ok(StrategyReport::single("recorded", 1))
        }
    }

    struct Harness {
        monitor: Arc<MemoryMonitor>,
        sampler: Arc<FixedSampler>,
        reclaimer: Arc<CountingReclaimer>,
        modes: Arc<Mutex<Vec<CleanupMode>>>,
        events: Arc<Mutex<Vec<MonitorEvent>>>,
    }

    fn harness(used: u64, config: MonitorConfig) -> Harness {
        let sampler = FixedSampler::new(used);
        let reclaimer = Arc::new(CountingReclaimer::default());
        let registry = Arc::new(CleanupRegistry::new(Duration::from_secs(1)));
        let modes = Arc::new(Mutex::new(Vec::new()));
        registry
            .register(Arc::new(ModeRecorder {
                modes: modes.clone(),
            }))
            .unwrap();

        let monitor = Arc::new(
            MemoryMonitor::new(config, sampler.clone(), reclaimer.clone(), registry).unwrap(),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.subscribe(Arc::new(move |event: &MonitorEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        Harness {
            monitor,
            sampler,
            reclaimer,
            modes,
            events,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_tier_reclaims_only_and_respects_cooldown() {
        let h = harness(800, MonitorConfig::default());

        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.tier, ThresholdTier::Warning);
        assert_eq!(
            report.action,
            TierAction::Cleaned {
                result: None,
                gc_passes: 1
            }
        );
        assert!(h.modes.lock().unwrap().is_empty());
        assert_eq!(h.reclaimer.passes.load(Ordering::SeqCst), 1);

        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.action, TierAction::CooldownActive);

        tokio::time::advance(Duration::from_millis(30_001)).await;
        let report = h.monitor.tick().await.unwrap();
        assert!(matches!(report.action, TierAction::Cleaned { .. }));
        assert_eq!(h.reclaimer.passes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_tier_runs_lightweight_cleanup() {
        let h = harness(900, MonitorConfig::default());

        let report = h.monitor.tick().await.unwrap();
        assert_eq!(report.tier, ThresholdTier::Critical);
        match report.action {
            TierAction::Cleaned { result, gc_passes } => {
                assert_eq!(gc_passes, 1);
                assert_eq!(result.map(|r| r.mode), Some(CleanupMode::Lightweight));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(*h.modes.lock().unwrap(), vec![CleanupMode::Lightweight]);

        // Critical waits only half the cooldown
        tokio::time::advance(Duration::from_millis(15_001)).await;
        assert!(matches!(
            h.monitor.tick().await.unwrap().action,
            TierAction::Cleaned { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_tier_deep_cleanup_with_fatal_report() {
        let h = harness(970, MonitorConfig::default());

        let first = h.monitor.tick().await.unwrap();
        assert_eq!(first.tier, ThresholdTier::Emergency);
        let second = h.monitor.tick().await.unwrap();
        assert!(matches!(second.action, TierAction::Cleaned { .. }));

        assert_eq!(
            *h.modes.lock().unwrap(),
            vec![CleanupMode::Deep, CleanupMode::Deep]
        );
        assert_eq!(h.reclaimer.passes.load(Ordering::SeqCst), 6);

        let events = h.events.lock().unwrap();
        let fatal = events
            .iter()
            .filter(|e| matches!(e, MonitorEvent::ErrorReport(r) if r.severity == Severity::Fatal))
            .count();
        assert_eq!(fatal, 2);
        assert!(events.iter().any(|e| matches!(
            e,
            MonitorEvent::Pressure {
                current: PressureLevel::Critical,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_limit_exceeded_event_after_cleanup() {
        let h = harness(500, MonitorConfig::default());
        // 1 MB limit against a sampler reporting 2 MB used
        h.sampler.set(2 * 1024 * 1024);
        h.monitor.set_memory_limit(Some(1)).unwrap();

        let report = h.monitor.tick().await.unwrap();
        assert!(!report.status.is_within_limit);
        assert_eq!(report.tier, ThresholdTier::Emergency);
        assert!(h
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, MonitorEvent::LimitExceeded { .. })));
    }

    #[test]
    fn test_adaptive_interval_widens_and_resets() {
        let config = MonitorConfig {
            check_interval_ms: 1_000,
            idle_samples_before_backoff: 2,
            max_interval_multiplier: 4,
            ..Default::default()
        };
        let h = harness(100, config);

        let intervals: Vec<u64> = (0..8)
            .map(|_| {
                h.monitor.check_usage().unwrap();
                h.monitor.current_interval().as_millis() as u64
            })
            .collect();
        assert_eq!(intervals, vec![1_000, 2_000, 2_000, 4_000, 4_000, 4_000, 4_000, 4_000]);

        h.sampler.set(600);
        h.monitor.check_usage().unwrap();
        assert_eq!(h.monitor.current_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_history_bounded_and_stats() {
        let config = MonitorConfig {
            max_history_size: 3,
            ..Default::default()
        };
        let h = harness(100, config);
        for used in [100, 300, 200, 400] {
            h.sampler.set(used);
            h.monitor.check_usage().unwrap();
        }

        let stats = h.monitor.stats();
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.peak_heap_used, 400);
        assert_eq!(stats.average_heap_used, 300);
        assert_eq!(h.monitor.history().len(), 3);

        h.monitor.clear_history();
        assert_eq!(h.monitor.stats().sample_count, 0);
    }

    #[test]
    fn test_sampling_error_propagates() {
        let registry = Arc::new(CleanupRegistry::new(Duration::from_secs(1)));
        let monitor = MemoryMonitor::new(
            MonitorConfig::default(),
            Arc::new(FailingSampler),
            Arc::new(CountingReclaimer::default()),
            registry,
        )
        .unwrap();
        assert!(matches!(monitor.check_usage(), Err(GuardError::Sampling(_))));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let h = harness(100, MonitorConfig::default());
        assert!(h.monitor.set_memory_limit(Some(0)).is_err());
        h.monitor.set_memory_limit(None).unwrap();
        assert_eq!(h.monitor.memory_limit_bytes(), None);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let h = harness(100, MonitorConfig::default());
        assert!(matches!(h.monitor.start(), Err(GuardError::NoRuntime(_))));
        assert!(!h.monitor.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_ticks_until_stopped() {
        let config = MonitorConfig {
            check_interval_ms: 100,
            ..Default::default()
        };
        let h = harness(100, config);
        h.monitor.start().unwrap();
        assert!(h.monitor.is_monitoring());

        tokio::time::sleep(Duration::from_millis(350)).await;
        let ticks = h.monitor.history().len();
        assert!(ticks >= 3, "expected at least 3 ticks, got {ticks}");

        h.monitor.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.monitor.is_monitoring());
        let frozen = h.monitor.history().len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.monitor.history().len(), frozen);
    }
}
