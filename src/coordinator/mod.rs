// Guard Coordinator
//
// *Le Coordinateur* (The Coordinator) - Unified API composing monitor, cleanup, breaker and chunking

mod degradation;
mod process;
mod types;

pub use degradation::DegradationSignal;
pub use types::{DegradationNotice, FallbackReason, FallbackTrigger, GuardStatus, ProcessingResult};

use crate::cache::{ContentCache, FlushableCache};
use crate::chunk::ProducerRegistry;
use crate::cleanup::strategies::{AuxiliaryCacheFlush, CacheFlushStrategy, FlushHook, HistoryTrimCleanup};
use crate::cleanup::{CleanupContext, CleanupMode, CleanupRegistry, CleanupResult, CleanupStrategy, CleanupTrigger};
use crate::config::GuardConfig;
use crate::detect::{DetectionResult, Detector, ExtensionDetector};
use crate::errors::{GuardError, Result};
use crate::memory::{
    AllocatorReclaimer, ListenerId, MemoryMonitor, MemorySample, MemorySampler, MemoryStats,
    MemoryStatus, MonitorEvent, ProcessSampler, Reclaimer, TREND_WINDOW,
};
use crate::parse::SourceParser;
use crate::selector::StrategySelector;
use crate::threshold::ErrorThreshold;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// GuardCoordinator - single entry point for guarded unit processing
///
/// Owns the memory monitor, the cleanup registry, the error threshold and the
/// chunking collaborators. Construct one per process with
/// [`GuardCoordinator::builder`] and pass it to call sites.
///
/// # Example
///
/// ```ignore
/// let guard = GuardCoordinator::builder(GuardConfig::default()).build()?;
/// guard.initialize()?;
/// let result = guard.process_unit("src/lib.rs", source.as_bytes()).await;
/// for chunk in &result.chunks {
///     println!("{}:{}-{}", chunk.kind, chunk.start_line, chunk.end_line);
/// }
/// guard.destroy();
/// ```
pub struct GuardCoordinator {
    config: GuardConfig,
    monitor: Arc<MemoryMonitor>,
    registry: Arc<CleanupRegistry>,
    errors: ErrorThreshold,
    selector: StrategySelector,
    detector: Arc<dyn Detector>,
    parser: Arc<dyn SourceParser>,
    producers: ProducerRegistry,
    detection_cache: Arc<ContentCache<DetectionResult>>,
    strategies: Vec<Arc<dyn CleanupStrategy>>,
    degradation: Arc<DegradationSignal>,
    initialized: AtomicBool,
    limit_listener: Mutex<Option<ListenerId>>,
}

/// Builder for [`GuardCoordinator`]; every collaborator has a default.
pub struct GuardCoordinatorBuilder {
    config: GuardConfig,
    detector: Option<Arc<dyn Detector>>,
    parser: Option<Arc<dyn SourceParser>>,
    producers: Option<ProducerRegistry>,
    sampler: Option<Arc<dyn MemorySampler>>,
    reclaimer: Option<Arc<dyn Reclaimer>>,
    strategies: Vec<Arc<dyn CleanupStrategy>>,
}

impl GuardCoordinatorBuilder {
    /// Replace the default extension detector
    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Replace the default parser
    pub fn parser(mut self, parser: Arc<dyn SourceParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Replace the default producers
    pub fn producers(mut self, producers: ProducerRegistry) -> Self {
        self.producers = Some(producers);
        self
    }

    /// Replace the process memory sampler
    pub fn sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Replace the allocator reclaimer
    pub fn reclaimer(mut self, reclaimer: Arc<dyn Reclaimer>) -> Self {
        self.reclaimer = Some(reclaimer);
        self
    }

    /// Register an extra cleanup strategy on initialize
    pub fn strategy(mut self, strategy: Arc<dyn CleanupStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Register a flush hook for a cache owned outside the guard
    pub fn auxiliary_cache(self, name: impl Into<String>, hook: FlushHook) -> Self {
        self.strategy(Arc::new(AuxiliaryCacheFlush::new(name, hook)))
    }

    /// Validate the configuration and wire everything together
    pub fn build(self) -> Result<GuardCoordinator> {
        let config = self.config;
        config.validate()?;

        let registry = Arc::new(CleanupRegistry::new(config.processing.strategy_timeout()));
        let monitor = Arc::new(MemoryMonitor::new(
            config.monitor.clone(),
            self.sampler.unwrap_or_else(|| Arc::new(ProcessSampler::new())),
            self.reclaimer.unwrap_or_else(|| Arc::new(AllocatorReclaimer)),
            registry.clone(),
        )?);

        let detection_cache = Arc::new(ContentCache::new(
            "detections",
            config.processing.detection_cache_size,
        ));

        let mut strategies: Vec<Arc<dyn CleanupStrategy>> = vec![
            Arc::new(CacheFlushStrategy::detection_cache(detection_cache.clone())),
            Arc::new(HistoryTrimCleanup::new(monitor.history_handle(), TREND_WINDOW)),
        ];

        let parser: Arc<dyn SourceParser> = match self.parser {
            Some(parser) => parser,
            None => default_parser(&config, &mut strategies),
        };
        strategies.extend(self.strategies);

        let selector = StrategySelector::new(config.selector.clone(), parser.supported_languages());

        Ok(GuardCoordinator {
            errors: ErrorThreshold::new(&config.errors),
            selector,
            detector: self.detector.unwrap_or_else(|| Arc::new(ExtensionDetector::new())),
            parser,
            producers: self.producers.unwrap_or_else(ProducerRegistry::with_defaults),
            detection_cache,
            strategies,
            degradation: Arc::new(DegradationSignal::new()),
            initialized: AtomicBool::new(false),
            limit_listener: Mutex::new(None),
            monitor,
            registry,
            config,
        })
    }
}

#[cfg(feature = "parse")]
fn default_parser(
    config: &GuardConfig,
    strategies: &mut Vec<Arc<dyn CleanupStrategy>>,
) -> Arc<dyn SourceParser> {
    let parser = crate::parse::TreeSitterParser::new(config.processing.parse_cache_size);
    strategies.push(Arc::new(CacheFlushStrategy::parse_cache(parser.cache())));
    Arc::new(parser)
}

#[cfg(not(feature = "parse"))]
fn default_parser(
    _config: &GuardConfig,
    _strategies: &mut Vec<Arc<dyn CleanupStrategy>>,
) -> Arc<dyn SourceParser> {
    Arc::new(crate::parse::NullParser)
}

impl GuardCoordinator {
    /// Start building a coordinator
    pub fn builder(config: GuardConfig) -> GuardCoordinatorBuilder {
        GuardCoordinatorBuilder {
            config,
            detector: None,
            parser: None,
            producers: None,
            sampler: None,
            reclaimer: None,
            strategies: Vec::new(),
        }
    }

    /// Build a coordinator with default collaborators
    pub fn new(config: GuardConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Configuration in use
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Register cleanup strategies, subscribe to limit events and start
    /// monitoring when enabled.
    ///
    /// Calling this twice is a no-op.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for strategy in &self.strategies {
            if let Err(err) = self.registry.register(strategy.clone()) {
                warn!(strategy = %strategy.name(), "Skipping cleanup strategy: {err}");
            }
        }

        let signal = self.degradation.clone();
        let monitor = Arc::downgrade(&self.monitor);
        let id = self.monitor.subscribe(Arc::new(move |event: &MonitorEvent| {
            if let MonitorEvent::LimitExceeded { status } = event {
                signal.publish("memory still over limit after cleanup", Some(status.clone()));
                if let Some(monitor) = monitor.upgrade() {
                    monitor.force_gc();
                }
            }
        }));
        *self.limit_listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);

        if self.config.enabled {
            if let Err(err) = self.monitor.start() {
                self.initialized.store(false, Ordering::SeqCst);
                self.teardown();
                return Err(err);
            }
        }

        info!(
            strategies = self.registry.len(),
            monitoring = self.monitor.is_monitoring(),
            "Guard initialized"
        );
        Ok(())
    }

    /// Stop monitoring, release listeners and unregister every strategy
    pub fn destroy(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.teardown();
        info!("Guard destroyed");
    }

    fn teardown(&self) {
        self.monitor.stop();
        if let Some(id) = self
            .limit_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.monitor.unsubscribe(id);
        }
        self.monitor.clear_listeners();
        self.registry.clear();
    }

    /// Zero the error window and drop history and cached detections
    pub fn reset(&self) {
        self.errors.reset();
        self.monitor.clear_history();
        self.detection_cache.flush();
        debug!("Guard state reset");
    }

    /// Whether `initialize` has run without a later `destroy`
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Start the sampling task
    pub fn start_monitoring(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(GuardError::MonitoringDisabled);
        }
        self.monitor.start()
    }

    /// Stop the sampling task
    pub fn stop_monitoring(&self) {
        self.monitor.stop();
    }

    /// Whether the sampling task is running
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_monitoring()
    }

    /// Take a sample and return the derived status
    pub fn check_memory_usage(&self) -> Result<MemoryStatus> {
        self.monitor.check_usage()
    }

    /// Run a deep cleanup plus one reclaimer pass.
    ///
    /// Returns [`GuardError::CleanupFailed`] naming the failed strategies when
    /// any strategy failed; the others still ran.
    pub async fn force_cleanup(&self) -> Result<CleanupResult> {
        let mut ctx = CleanupContext::new(CleanupMode::Deep, CleanupTrigger::Manual);
        if let Ok(status) = self.monitor.peek_usage() {
            ctx = ctx.with_status(status);
        }

        let result = self.registry.perform_cleanup(&ctx).await;
        self.monitor.force_gc();

        if result.success {
            Ok(result)
        } else {
            Err(GuardError::CleanupFailed {
                failed: result.failed_strategies(),
                message: result.error.clone().unwrap_or_default(),
            })
        }
    }

    /// Publish a degradation notice, then force a reclaimer pass
    pub fn graceful_degradation(&self) -> DegradationNotice {
        self.degrade("requested", self.monitor.peek_usage().ok())
    }

    pub(crate) fn degrade(&self, reason: &str, status: Option<MemoryStatus>) -> DegradationNotice {
        let notice = self.degradation.publish(reason, status);
        self.monitor.force_gc();
        notice
    }

    /// Observe degradation notices
    pub fn subscribe_degradation(&self) -> watch::Receiver<Option<DegradationNotice>> {
        self.degradation.subscribe()
    }

    /// Monitor statistics
    pub fn memory_stats(&self) -> MemoryStats {
        self.monitor.stats()
    }

    /// Recorded samples, oldest first
    pub fn memory_history(&self) -> Vec<MemorySample> {
        self.monitor.history()
    }

    /// Drop recorded samples
    pub fn clear_history(&self) {
        self.monitor.clear_history();
    }

    /// Set or clear the hard memory limit in MB
    pub fn set_memory_limit(&self, limit_mb: Option<u64>) -> Result<()> {
        self.monitor.set_memory_limit(limit_mb)
    }

    /// One reclaimer pass
    pub fn force_gc(&self) -> bool {
        self.monitor.force_gc()
    }

    /// Whether the error threshold is open
    pub fn should_use_fallback(&self) -> bool {
        self.errors.should_fallback()
    }

    /// Count an error against the threshold
    pub fn record_error(&self, error: &dyn std::fmt::Display, context: &str) {
        self.errors.record_error(error, context);
    }

    /// Snapshot of breaker, memory and lifecycle state; never fails
    pub fn status(&self) -> GuardStatus {
        let memory = match self.monitor.peek_usage() {
            Ok(status) => status,
            Err(err) => {
                debug!("Memory status unavailable: {err}");
                self.monitor
                    .history()
                    .last()
                    .map(|sample| {
                        MemoryStatus::derive(
                            sample,
                            &[],
                            self.monitor.memory_limit_bytes(),
                            &self.config.monitor,
                        )
                    })
                    .unwrap_or_default()
            }
        };

        GuardStatus {
            error_window: self.errors.snapshot(),
            memory,
            is_initialized: self.is_initialized(),
            is_monitoring: self.monitor.is_monitoring(),
            degradations: self.degradation.count(),
            cleanup_strategies: self.registry.names(),
        }
    }

    /// Shared handle to the monitor
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    /// Shared handle to the cleanup registry
    pub fn registry(&self) -> &Arc<CleanupRegistry> {
        &self.registry
    }
}

impl Drop for GuardCoordinator {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

impl std::fmt::Debug for GuardCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardCoordinator")
            .field("initialized", &self.is_initialized())
            .field("monitor", &self.monitor)
            .field("registry", &self.registry)
            .field("producers", &self.producers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NoopReclaimer;
    use std::sync::atomic::AtomicU64;

    const MB: u64 = 1024 * 1024;

    /// Sampler whose `heap_used` can be changed between calls
    struct DialSampler {
        used: AtomicU64,
        total: u64,
    }

    impl DialSampler {
        fn new(used: u64, total: u64) -> Arc<Self> {
            Arc::new(Self {
                used: AtomicU64::new(used),
                total,
            })
        }
    }

    impl MemorySampler for DialSampler {
        fn sample(&self) -> Result<MemorySample> {
            let used = self.used.load(Ordering::SeqCst);
            Ok(MemorySample::now(used, self.total, used, 0))
        }
    }

    fn guard_with(sampler: Arc<DialSampler>, config: GuardConfig) -> GuardCoordinator {
        GuardCoordinator::builder(config)
            .sampler(sampler)
            .reclaimer(Arc::new(NoopReclaimer))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_registers_builtin_strategies() {
        let guard = guard_with(DialSampler::new(10 * MB, 1000 * MB), GuardConfig::default());
        guard.initialize().unwrap();

        let names = guard.registry().names();
        assert!(names.contains(&"detection-cache".to_string()));
        assert!(names.contains(&"memory-history".to_string()));
        assert!(guard.is_initialized());
        assert!(guard.is_monitoring());

        guard.destroy();
        assert!(!guard.is_initialized());
        assert!(!guard.is_monitoring());
        assert!(guard.registry().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = GuardConfig::default();
        config.monitor.warning_threshold = 0.99;
        assert!(matches!(
            GuardCoordinator::new(config),
            Err(GuardError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_monitoring_disabled() {
        let config = GuardConfig {
            enabled: false,
            ..Default::default()
        };
        let guard = guard_with(DialSampler::new(MB, 100 * MB), config);
        guard.initialize().unwrap();
        assert!(!guard.is_monitoring());
        assert!(matches!(guard.start_monitoring(), Err(GuardError::MonitoringDisabled)));
    }

    #[tokio::test]
    async fn test_force_cleanup_reports_failures() {
        let failing: FlushHook = Arc::new(|_: CleanupMode| -> anyhow::Result<u64> {
            anyhow::bail!("disk cache locked")
        });
        let guard = GuardCoordinator::builder(GuardConfig::default())
            .sampler(DialSampler::new(MB, 100 * MB))
            .reclaimer(Arc::new(NoopReclaimer))
            .auxiliary_cache("embeddings", failing)
            .build()
            .unwrap();
        guard.initialize().unwrap();

        match guard.force_cleanup().await {
            Err(GuardError::CleanupFailed { failed, message }) => {
                assert_eq!(failed, vec!["embeddings".to_string()]);
                assert!(message.contains("disk cache locked"));
            }
            other => panic!("expected CleanupFailed, got {other:?}"),
        }
        guard.destroy();
    }

    #[tokio::test]
    async fn test_limit_exceeded_event_degrades() {
        let sampler = DialSampler::new(200 * MB, 1000 * MB);
        let mut config = GuardConfig::default();
        config.monitor.memory_limit_mb = Some(100);
        let guard = guard_with(sampler, config);
        guard.initialize().unwrap();
        let rx = guard.subscribe_degradation();

        guard.monitor().tick().await.unwrap();

        let notice = rx.borrow().clone().expect("notice published");
        assert_eq!(notice.sequence, 1);
        assert!(notice.status.is_some_and(|s| !s.is_within_limit));
        guard.destroy();
    }

    #[tokio::test]
    async fn test_graceful_degradation_and_status() {
        let guard = guard_with(DialSampler::new(50 * MB, 100 * MB), GuardConfig::default());
        let notice = guard.graceful_degradation();
        assert_eq!(notice.reason, "requested");

        guard.record_error(&"boom", "test");
        let status = guard.status();
        assert_eq!(status.degradations, 1);
        assert_eq!(status.error_window.count, 1);
        assert!(!status.is_initialized);
        assert!((status.memory.usage_ratio - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reset_clears_errors_and_history() {
        let guard = guard_with(DialSampler::new(MB, 100 * MB), GuardConfig::default());
        for _ in 0..5 {
            guard.record_error(&"boom", "test");
        }
        guard.check_memory_usage().unwrap();
        assert!(guard.should_use_fallback());
        assert_eq!(guard.memory_history().len(), 1);

        guard.reset();
        assert!(!guard.should_use_fallback());
        assert!(guard.memory_history().is_empty());
    }
}
