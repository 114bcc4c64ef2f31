// Derived memory status
//
// Pure functions turning samples into trend, health and pressure. Kept free of
// locks and clocks so they can be tested in isolation.

use super::sampler::MemorySample;
use crate::config::MonitorConfig;
use serde::{Deserialize, Serialize};

const MB: f64 = 1024.0 * 1024.0;

/// Number of most recent samples considered for trend and growth rate.
pub const TREND_WINDOW: usize = 5;

/// Direction of memory usage over the trend window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTrend {
    /// Usage grew by more than the configured delta
    Increasing,
    /// Usage shrank by more than the configured delta
    Decreasing,
    /// Usage moved less than the configured delta
    Stable,
}

/// Coarse classification of current memory risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// Nothing to do
    Low,
    /// Worth watching
    Moderate,
    /// Cleanup advised
    High,
    /// Exhaustion is near
    Critical,
}

/// Which cleanup tier a usage ratio falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdTier {
    /// Below the warning threshold
    Normal,
    /// At or above the warning threshold
    Warning,
    /// At or above the critical threshold
    Critical,
    /// At or above the emergency threshold
    Emergency,
}

impl ThresholdTier {
    /// Classify a usage ratio against the configured thresholds
    pub fn for_ratio(ratio: f64, config: &MonitorConfig) -> Self {
        if ratio >= config.emergency_threshold {
            ThresholdTier::Emergency
        } else if ratio >= config.critical_threshold {
            ThresholdTier::Critical
        } else if ratio >= config.warning_threshold {
            ThresholdTier::Warning
        } else {
            ThresholdTier::Normal
        }
    }
}

/// Point-in-time memory status derived from the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    /// Bytes in use at the latest sample
    pub heap_used: u64,

    /// Sampler-reported capacity at the latest sample
    pub heap_total: u64,

    /// Resident set size at the latest sample
    pub resident_set_size: u64,

    /// Denominator used for the usage ratio (limit if set, else heap total)
    pub capacity_bytes: u64,

    /// `heap_used / capacity_bytes`
    pub usage_ratio: f64,

    /// `usage_ratio * 100`
    pub usage_percent: f64,

    /// Direction over the trend window
    pub trend: MemoryTrend,

    /// Risk classification
    pub pressure_level: PressureLevel,

    /// 0-100 composite score
    pub health_score: f64,

    /// Bytes per second over the trend window (negative when shrinking)
    pub growth_rate_bytes_per_sec: f64,

    /// Predicted seconds until the capacity is reached, when growing
    pub time_to_limit_secs: Option<f64>,

    /// Configured hard limit in bytes
    pub memory_limit_bytes: Option<u64>,

    /// `heap_used <= memory_limit_bytes`, true when no limit is set
    pub is_within_limit: bool,
}

impl Default for MemoryStatus {
    fn default() -> Self {
        Self {
            heap_used: 0,
            heap_total: 0,
            resident_set_size: 0,
            capacity_bytes: 0,
            usage_ratio: 0.0,
            usage_percent: 0.0,
            trend: MemoryTrend::Stable,
            pressure_level: PressureLevel::Low,
            health_score: 100.0,
            growth_rate_bytes_per_sec: 0.0,
            time_to_limit_secs: None,
            memory_limit_bytes: None,
            is_within_limit: true,
        }
    }
}

impl MemoryStatus {
    /// Derive a status from the newest sample and the trend window
    pub fn derive(
        latest: &MemorySample,
        window: &[MemorySample],
        limit_bytes: Option<u64>,
        config: &MonitorConfig,
    ) -> Self {
        let capacity = limit_bytes.unwrap_or(latest.heap_total);
        let usage_ratio = usage_ratio(latest.heap_used, capacity);
        let growth = growth_rate(window);
        let trend = trend(window, config.trend_delta_bytes);
        let health_score = health_score(usage_ratio * 100.0, growth);
        let pressure_level = pressure_level(usage_ratio, health_score, config);

        let time_to_limit_secs = if growth > 0.0 && capacity > latest.heap_used {
            Some((capacity - latest.heap_used) as f64 / growth)
        } else {
            None
        };

        Self {
            heap_used: latest.heap_used,
            heap_total: latest.heap_total,
            resident_set_size: latest.resident_set_size,
            capacity_bytes: capacity,
            usage_ratio,
            usage_percent: usage_ratio * 100.0,
            trend,
            pressure_level,
            health_score,
            growth_rate_bytes_per_sec: growth,
            time_to_limit_secs,
            memory_limit_bytes: limit_bytes,
            is_within_limit: limit_bytes.map_or(true, |limit| latest.heap_used <= limit),
        }
    }

    /// Which cleanup tier this status falls in
    pub fn tier(&self, config: &MonitorConfig) -> ThresholdTier {
        ThresholdTier::for_ratio(self.usage_ratio, config)
    }
}

/// Ratio of used bytes to capacity; zero capacity reads as empty.
pub fn usage_ratio(used: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    used as f64 / capacity as f64
}

/// Bytes per second between the first and last sample of the window.
pub fn growth_rate(window: &[MemorySample]) -> f64 {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return 0.0;
    };
    let elapsed = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return 0.0;
    }
    (last.heap_used as f64 - first.heap_used as f64) / elapsed
}

/// Compare the first and last sample of the window against an explicit byte delta.
pub fn trend(window: &[MemorySample], delta_bytes: u64) -> MemoryTrend {
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return MemoryTrend::Stable;
    };
    let delta = last.heap_used as i128 - first.heap_used as i128;
    if delta > delta_bytes as i128 {
        MemoryTrend::Increasing
    } else if delta < -(delta_bytes as i128) {
        MemoryTrend::Decreasing
    } else {
        MemoryTrend::Stable
    }
}

/// Composite 0-100 score penalizing high usage and fast growth.
pub fn health_score(usage_percent: f64, growth_bytes_per_sec: f64) -> f64 {
    let mut score: f64 = 100.0;

    if usage_percent >= 90.0 {
        score -= 30.0;
    } else if usage_percent >= 80.0 {
        score -= 15.0;
    } else if usage_percent >= 70.0 {
        score -= 5.0;
    }

    let growth_mb = growth_bytes_per_sec / MB;
    if growth_mb > 5.0 {
        score -= 10.0;
    } else if growth_mb > 2.0 {
        score -= 5.0;
    }

    score.clamp(0.0, 100.0)
}

/// Pressure from usage ratio and health, highest matching level wins.
pub fn pressure_level(usage_ratio: f64, health: f64, config: &MonitorConfig) -> PressureLevel {
    if usage_ratio >= config.emergency_threshold || health < 30.0 {
        PressureLevel::Critical
    } else if usage_ratio >= config.critical_threshold || health < 50.0 {
        PressureLevel::High
    } else if usage_ratio >= config.warning_threshold || health < 70.0 {
        PressureLevel::Moderate
    } else {
        PressureLevel::Low
    }
}
