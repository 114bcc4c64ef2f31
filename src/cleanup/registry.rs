use super::{CleanupContext, CleanupResult, CleanupStrategy, StrategyOutcome};
use crate::errors::{GuardError, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry of named, prioritized cleanup strategies.
///
/// Strategies run one after another in ascending priority. Overlapping calls
/// to [`perform_cleanup`](Self::perform_cleanup) are serialized by a
/// single-flight gate: a caller that had to wait for an in-flight run reuses
/// that run's result when it was at least as deep as the one requested.
pub struct CleanupRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn CleanupStrategy>>>,
    strategy_timeout: Duration,
    gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    last_result: Mutex<Option<CleanupResult>>,
}

impl CleanupRegistry {
    /// Create an empty registry with a per-strategy deadline
    pub fn new(strategy_timeout: Duration) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            strategy_timeout,
            gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last_result: Mutex::new(None),
        }
    }

    /// Register a strategy.
    ///
    /// Returns `Ok(false)` when the strategy reports itself unavailable and was
    /// skipped. Registering a name twice replaces the earlier strategy.
    pub fn register(&self, strategy: Arc<dyn CleanupStrategy>) -> Result<bool> {
        let name = strategy.name().to_string();
        if name.trim().is_empty() {
            return Err(GuardError::InvalidStrategy(
                "strategy name must not be empty".to_string(),
            ));
        }

        if !strategy.is_available() {
            warn!(strategy = %name, "Cleanup strategy unavailable; not registering");
            return Ok(false);
        }

        let previous = self
            .strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), strategy);
        if previous.is_some() {
            debug!(strategy = %name, "Replaced existing cleanup strategy");
        } else {
            info!(strategy = %name, "Registered cleanup strategy");
        }
        Ok(true)
    }

    /// Remove a strategy by name
    pub fn unregister(&self, name: &str) -> bool {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Remove every strategy
    pub fn clear(&self) {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Registered names in execution order
    pub fn names(&self) -> Vec<String> {
        self.ordered(|_| true)
            .into_iter()
            .map(|strategy| strategy.name().to_string())
            .collect()
    }

    /// Number of registered strategies
    pub fn len(&self) -> usize {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no strategy is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Result of the most recent completed run
    pub fn last_result(&self) -> Option<CleanupResult> {
        self.last_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run every applicable strategy and aggregate the outcomes.
    pub async fn perform_cleanup(&self, ctx: &CleanupContext) -> CleanupResult {
        let observed = self.generation.load(Ordering::SeqCst);
        let _permit = self.gate.lock().await;

        if self.generation.load(Ordering::SeqCst) != observed {
            if let Some(mut shared) = self.last_result() {
                if shared.mode >= ctx.mode {
                    debug!(mode = ?ctx.mode, "Coalesced cleanup into the run that just finished");
                    shared.coalesced = true;
                    return shared;
                }
            }
        }

        let result = self.run(ctx).await;

        *self
            .last_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Sum the estimates of every applicable strategy, skipping failures.
    pub fn estimate_impact(&self, ctx: &CleanupContext) -> u64 {
        let mut total = 0u64;
        for strategy in self.applicable(ctx) {
            match catch_unwind(AssertUnwindSafe(|| strategy.estimate_impact(ctx))) {
                Ok(Ok(bytes)) => total = total.saturating_add(bytes),
                Ok(Err(err)) => {
                    warn!(strategy = %strategy.name(), "Impact estimate failed: {err:#}");
                }
                Err(_) => {
                    warn!(strategy = %strategy.name(), "Impact estimate panicked");
                }
            }
        }
        total
    }

    async fn run(&self, ctx: &CleanupContext) -> CleanupResult {
        let started = Instant::now();
        let strategies = self.applicable(ctx);
        let mut outcomes = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            outcomes.push(self.run_one(strategy.as_ref(), ctx).await);
        }

        let result = CleanupResult::from_outcomes(
            outcomes,
            ctx.mode,
            started.elapsed().as_millis() as u64,
        );

        if result.success {
            info!(
                mode = ?ctx.mode,
                bytes_freed = result.bytes_freed,
                targets = result.cleaned_targets.len(),
                "Cleanup completed"
            );
        } else {
            warn!(
                mode = ?ctx.mode,
                "Cleanup completed with failures: {}",
                result.error.as_deref().unwrap_or_default()
            );
        }
        result
    }

    async fn run_one(&self, strategy: &dyn CleanupStrategy, ctx: &CleanupContext) -> StrategyOutcome {
        let name = strategy.name().to_string();
        let started = Instant::now();
        let guarded = AssertUnwindSafe(strategy.cleanup(ctx)).catch_unwind();

        let outcome = match tokio::time::timeout(self.strategy_timeout, guarded).await {
            Ok(Ok(Ok(report))) => Ok(report),
            Ok(Ok(Err(err))) => Err(format!("{err:#}")),
            Ok(Err(_)) => Err("strategy panicked".to_string()),
            Err(_) => Err(GuardError::timeout(
                format!("cleanup strategy '{name}'"),
                self.strategy_timeout.as_millis() as u64,
            )
            .to_string()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(report) => {
                debug!(strategy = %name, bytes_freed = report.bytes_freed, "Cleanup strategy succeeded");
                StrategyOutcome {
                    name,
                    success: true,
                    targets: report.targets,
                    bytes_freed: report.bytes_freed,
                    duration_ms,
                    error: None,
                }
            }
            Err(message) => {
                warn!(strategy = %name, "Cleanup strategy failed: {message}");
                StrategyOutcome {
                    name,
                    success: false,
                    targets: Vec::new(),
                    bytes_freed: 0,
                    duration_ms,
                    error: Some(message),
                }
            }
        }
    }

    fn applicable(&self, ctx: &CleanupContext) -> Vec<Arc<dyn CleanupStrategy>> {
        self.ordered(|strategy| {
            catch_unwind(AssertUnwindSafe(|| {
                strategy.is_available() && strategy.is_applicable(ctx)
            }))
            .unwrap_or_else(|_| {
                warn!(strategy = %strategy.name(), "Applicability check panicked; skipping");
                false
            })
        })
    }

    fn ordered<F>(&self, keep: F) -> Vec<Arc<dyn CleanupStrategy>>
    where
        F: Fn(&dyn CleanupStrategy) -> bool,
    {
        let mut selected: Vec<Arc<dyn CleanupStrategy>> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|strategy| keep(strategy.as_ref()))
            .cloned()
            .collect();
        selected.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        selected
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("strategies", &self.names())
            .field("strategy_timeout", &self.strategy_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::{CleanupMode, CleanupTrigger, StrategyReport};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct TestStrategy {
        name: String,
        priority: i32,
        bytes: u64,
        behavior: Behavior,
        available: bool,
        deep_only: bool,
        calls: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl TestStrategy {
        fn new(name: &str, priority: i32, bytes: u64, behavior: Behavior) -> Self {
            Self {
                name: name.to_string(),
                priority,
                bytes,
                behavior,
                available: true,
                deep_only: false,
                calls: Arc::new(AtomicUsize::new(0)),
                order: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_order(mut self, order: Arc<Mutex<Vec<String>>>) -> Self {
            self.order = order;
            self
        }
    }

    #[async_trait]
    impl CleanupStrategy for TestStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn is_applicable(&self, ctx: &CleanupContext) -> bool {
            !self.deep_only || ctx.is_deep()
        }

        fn estimate_impact(&self, _ctx: &CleanupContext) -> anyhow::Result<u64> {
            match self.behavior {
                Behavior::Fail => Err(anyhow::anyhow!("cannot estimate")),
                _ => Ok(self.bytes),
            }
        }

        async fn cleanup(&self, _ctx: &CleanupContext) -> anyhow::Result<StrategyReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.name.clone());
            match self.behavior {
                Behavior::Succeed => Ok(StrategyReport::single(format!("{}-cache", self.name), self.bytes)),
                Behavior::Fail => Err(anyhow::anyhow!("{} exploded", self.name)),
                Behavior::Panic => panic!("strategy panic"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(StrategyReport::default())
                }
            }
        }
    }

    fn ctx(mode: CleanupMode) -> CleanupContext {
        CleanupContext::new(mode, CleanupTrigger::Manual)
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let registry = CleanupRegistry::new(Duration::from_secs(5));
        let order = Arc::new(Mutex::new(Vec::new()));
        for strategy in [
            TestStrategy::new("first", 1, 100, Behavior::Fail),
            TestStrategy::new("second", 2, 20, Behavior::Succeed),
            TestStrategy::new("third", 3, 30, Behavior::Succeed),
        ] {
            registry
                .register(Arc::new(strategy.with_order(order.clone())))
                .expect("register");
        }

        let result = registry.perform_cleanup(&ctx(CleanupMode::Lightweight)).await;

        assert!(!result.success);
        assert_eq!(
            result.cleaned_targets.iter().cloned().collect::<Vec<_>>(),
            vec!["second-cache".to_string(), "third-cache".to_string()]
        );
        assert_eq!(result.bytes_freed, 50);
        let message = result.error.expect("aggregate error");
        assert!(message.contains("first"));
        assert!(!message.contains("second"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_panicking_strategy_is_captured() {
        let registry = CleanupRegistry::new(Duration::from_secs(5));
        registry
            .register(Arc::new(TestStrategy::new("panicky", 1, 10, Behavior::Panic)))
            .expect("register");
        registry
            .register(Arc::new(TestStrategy::new("steady", 2, 10, Behavior::Succeed)))
            .expect("register");

        let result = registry.perform_cleanup(&ctx(CleanupMode::Deep)).await;
        assert!(!result.success);
        assert_eq!(result.failed_strategies(), vec!["panicky".to_string()]);
        assert_eq!(result.bytes_freed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_strategy_times_out() {
        let registry = CleanupRegistry::new(Duration::from_millis(100));
        registry
            .register(Arc::new(TestStrategy::new("slow", 1, 10, Behavior::Hang)))
            .expect("register");
        registry
            .register(Arc::new(TestStrategy::new("fast", 2, 7, Behavior::Succeed)))
            .expect("register");

        let result = registry.perform_cleanup(&ctx(CleanupMode::Deep)).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
        assert_eq!(result.bytes_freed, 7);
    }

    #[tokio::test]
    async fn test_registration_rules() {
        let registry = CleanupRegistry::new(Duration::from_secs(1));

        let unnamed = TestStrategy::new("  ", 1, 0, Behavior::Succeed);
        assert!(matches!(
            registry.register(Arc::new(unnamed)),
            Err(GuardError::InvalidStrategy(_))
        ));

        let mut unavailable = TestStrategy::new("offline", 1, 0, Behavior::Succeed);
        unavailable.available = false;
        assert!(!registry.register(Arc::new(unavailable)).expect("register"));
        assert!(registry.is_empty());

        registry
            .register(Arc::new(TestStrategy::new("dup", 5, 1, Behavior::Succeed)))
            .expect("register");
        registry
            .register(Arc::new(TestStrategy::new("dup", 1, 2, Behavior::Succeed)))
            .expect("register");
        assert_eq!(registry.len(), 1);

        let result = registry.perform_cleanup(&ctx(CleanupMode::Lightweight)).await;
        assert_eq!(result.bytes_freed, 2);

        assert!(registry.unregister("dup"));
        assert!(!registry.unregister("dup"));
    }

    #[tokio::test]
    async fn test_deep_only_strategy_skipped_on_lightweight() {
        let registry = CleanupRegistry::new(Duration::from_secs(1));
        let mut deep = TestStrategy::new("deep", 1, 40, Behavior::Succeed);
        deep.deep_only = true;
        let calls = deep.calls.clone();
        registry.register(Arc::new(deep)).expect("register");

        let light = registry.perform_cleanup(&ctx(CleanupMode::Lightweight)).await;
        assert!(light.success);
        assert!(light.breakdown.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let deep = registry.perform_cleanup(&ctx(CleanupMode::Deep)).await;
        assert_eq!(deep.bytes_freed, 40);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_estimate_skips_failures() {
        let registry = CleanupRegistry::new(Duration::from_secs(1));
        registry
            .register(Arc::new(TestStrategy::new("broken", 1, 500, Behavior::Fail)))
            .expect("register");
        registry
            .register(Arc::new(TestStrategy::new("ok-a", 2, 30, Behavior::Succeed)))
            .expect("register");
        registry
            .register(Arc::new(TestStrategy::new("ok-b", 3, 12, Behavior::Succeed)))
            .expect("register");

        assert_eq!(registry.estimate_impact(&ctx(CleanupMode::Deep)), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_calls_coalesce() {
        let registry = Arc::new(CleanupRegistry::new(Duration::from_secs(5)));
        let strategy = TestStrategy::new("counted", 1, 10, Behavior::Succeed);
        let calls = strategy.calls.clone();
        registry.register(Arc::new(strategy)).expect("register");

        // Hold the gate so both callers queue behind an in-flight run.
        let permit = registry.gate.lock().await;
        let a = tokio::spawn({
            let registry = registry.clone();
            async move { registry.perform_cleanup(&ctx(CleanupMode::Deep)).await }
        });
        let b = tokio::spawn({
            let registry = registry.clone();
            async move { registry.perform_cleanup(&ctx(CleanupMode::Lightweight)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.generation.fetch_add(1, Ordering::SeqCst);
        *registry.last_result.lock().unwrap() = Some(CleanupResult::from_outcomes(
            Vec::new(),
            CleanupMode::Deep,
            0,
        ));
        drop(permit);

        let (a, b) = (a.await.expect("join"), b.await.expect("join"));
        assert!(a.coalesced);
        assert!(b.coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let fresh = registry.perform_cleanup(&ctx(CleanupMode::Lightweight)).await;
        assert!(!fresh.coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
