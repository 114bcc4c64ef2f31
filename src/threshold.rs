// Error Threshold
//
// *Le Disjoncteur* (The Circuit Breaker) - Error-rate gate routing work to fallback

use crate::config::ErrorThresholdConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Snapshot of the current error window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorWindow {
    /// Errors recorded in the current window
    pub count: u32,

    /// Errors at which the breaker trips
    pub max_errors: u32,

    /// Milliseconds until the window resets
    pub window_reset_in_ms: u64,

    /// Total errors since construction
    pub total_errors: u64,

    /// Message of the last recorded error
    pub last_error: Option<String>,

    /// Context of the last recorded error
    pub last_context: Option<String>,
}

impl ErrorWindow {
    /// Whether the breaker is open
    pub fn should_fallback(&self) -> bool {
        self.count >= self.max_errors
    }
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    window_started: Instant,
    total_errors: u64,
    last_error: Option<String>,
    last_context: Option<String>,
}

/// Counts errors within a window and trips once `max_errors` is reached.
///
/// The window resets lazily: the first observation after `reset_interval`
/// has elapsed zeroes the count. There is no background timer.
#[derive(Debug)]
pub struct ErrorThreshold {
    max_errors: u32,
    reset_interval: Duration,
    state: Mutex<WindowState>,
}

impl ErrorThreshold {
    /// Create a breaker from configuration
    pub fn new(config: &ErrorThresholdConfig) -> Self {
        Self {
            max_errors: config.max_errors.max(1),
            reset_interval: Duration::from_millis(config.reset_interval_ms),
            state: Mutex::new(WindowState {
                count: 0,
                window_started: Instant::now(),
                total_errors: 0,
                last_error: None,
                last_context: None,
            }),
        }
    }

    /// Record one error with the context it happened in
    pub fn record_error(&self, error: &dyn std::fmt::Display, context: &str) {
        let mut state = self.lock();
        self.expire(&mut state);

        state.count = state.count.saturating_add(1);
        state.total_errors += 1;
        state.last_error = Some(error.to_string());
        state.last_context = Some(context.to_string());

        if state.count == self.max_errors {
            warn!(
                count = state.count,
                context,
                "Error threshold reached; routing work to fallback"
            );
        }
    }

    /// Whether the error count in the current window has reached the limit
    pub fn should_fallback(&self) -> bool {
        let mut state = self.lock();
        self.expire(&mut state);
        state.count >= self.max_errors
    }

    /// Force the count to zero and start a new window
    pub fn reset(&self) {
        let mut state = self.lock();
        state.count = 0;
        state.window_started = Instant::now();
        info!("Error threshold reset");
    }

    /// Current window, after applying a pending lazy reset
    pub fn snapshot(&self) -> ErrorWindow {
        let mut state = self.lock();
        self.expire(&mut state);
        let elapsed = state.window_started.elapsed();

        ErrorWindow {
            count: state.count,
            max_errors: self.max_errors,
            window_reset_in_ms: self.reset_interval.saturating_sub(elapsed).as_millis() as u64,
            total_errors: state.total_errors,
            last_error: state.last_error.clone(),
            last_context: state.last_context.clone(),
        }
    }

    fn expire(&self, state: &mut WindowState) {
        if state.window_started.elapsed() >= self.reset_interval {
            if state.count > 0 {
                info!(count = state.count, "Error window elapsed; resetting");
            }
            state.count = 0;
            state.window_started = Instant::now();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn breaker(max_errors: u32, reset_interval_ms: u64) -> ErrorThreshold {
        ErrorThreshold::new(&ErrorThresholdConfig {
            max_errors,
            reset_interval_ms,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_at_max_errors() {
        let threshold = breaker(3, 60_000);
        for _ in 0..2 {
            threshold.record_error(&"parse failed", "detect");
        }
        assert!(!threshold.should_fallback());

        threshold.record_error(&"parse failed", "execute");
        assert!(threshold.should_fallback());

        let window = threshold.snapshot();
        assert_eq!(window.count, 3);
        assert_eq!(window.last_context.as_deref(), Some("execute"));
        assert!(window.should_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_lazily() {
        let threshold = breaker(2, 1_000);
        threshold.record_error(&"a", "x");
        threshold.record_error(&"b", "x");
        assert!(threshold.should_fallback());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(threshold.should_fallback());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!threshold.should_fallback());
        assert_eq!(threshold.snapshot().count, 0);
        assert_eq!(threshold.snapshot().total_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_reset() {
        let threshold = breaker(1, 60_000);
        threshold.record_error(&"boom", "x");
        assert!(threshold.should_fallback());
        threshold.reset();
        assert!(!threshold.should_fallback());
        assert_eq!(threshold.snapshot().window_reset_in_ms, 60_000);
    }

    proptest! {
        #[test]
        fn prop_fallback_iff_count_reaches_max(max_errors in 1u32..20, errors in 0u32..40) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(async {
                let threshold = breaker(max_errors, 60_000);
                for i in 0..errors {
                    threshold.record_error(&i, "prop");
                    prop_assert_eq!(threshold.should_fallback(), i + 1 >= max_errors);
                }
                prop_assert_eq!(threshold.snapshot().count, errors);
                Ok(())
            })?;
        }
    }
}
