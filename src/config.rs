// Guard Configuration
//
// *La Configuration* (The Configuration) - Thresholds, windows and deadlines for LeGarde

use crate::errors::{GuardError, Result as GuardResult};
use crate::selector::ProcessingTier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = ".legarde/config.toml";

const MB: u64 = 1024 * 1024;

/// Top-level guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Master switch for memory monitoring and cleanup
    pub enabled: bool,

    /// Memory monitor settings
    pub monitor: MonitorConfig,

    /// Circuit breaker settings
    pub errors: ErrorThresholdConfig,

    /// Node tracker settings
    pub tracker: TrackerConfig,

    /// Strategy selection settings
    pub selector: SelectorConfig,

    /// Deadlines and cache sizes for unit processing
    pub processing: ProcessingConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            monitor: MonitorConfig::default(),
            errors: ErrorThresholdConfig::default(),
            tracker: TrackerConfig::default(),
            selector: SelectorConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a project directory
    ///
    /// Looks for `.legarde/config.toml` in the directory. If not found, returns the
    /// default configuration.
    pub fn load<P: AsRef<Path>>(project_path: P) -> Result<Self> {
        let config_path = project_path.as_ref().join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            return Ok(GuardConfig::default());
        }

        Self::load_file(&config_path)
    }

    /// Load and validate configuration from an explicit TOML file
    pub fn load_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: GuardConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", config_path))?;

        Ok(config)
    }

    /// Save configuration to a project directory
    ///
    /// Creates the `.legarde` directory if it doesn't exist.
    pub fn save<P: AsRef<Path>>(&self, project_path: P) -> Result<()> {
        let config_dir = project_path.as_ref().join(".legarde");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        let config_path = config_dir.join("config.toml");

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&config_path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> GuardResult<()> {
        self.monitor.validate()?;
        self.errors.validate()?;
        self.tracker.validate()?;
        self.selector.validate()?;
        self.processing.validate()?;
        Ok(())
    }
}

/// Memory monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Usage ratio that starts warning-tier cleanup
    pub warning_threshold: f64,

    /// Usage ratio that starts critical-tier cleanup
    pub critical_threshold: f64,

    /// Usage ratio that starts emergency-tier cleanup
    pub emergency_threshold: f64,

    /// Base sampling interval in milliseconds
    pub check_interval_ms: u64,

    /// Minimum time between two cleanups in milliseconds
    pub cleanup_cooldown_ms: u64,

    /// Maximum number of samples kept in history
    pub max_history_size: usize,

    /// Hard memory limit in MB (None = use sampler capacity)
    pub memory_limit_mb: Option<u64>,

    /// Usage ratio below which the sampling interval may widen
    pub low_water_mark: f64,

    /// Consecutive low samples before the interval widens
    pub idle_samples_before_backoff: u32,

    /// Upper bound on the widened interval, as a multiple of the base interval
    pub max_interval_multiplier: u32,

    /// Byte delta over the trend window that counts as growth or shrinkage
    pub trend_delta_bytes: u64,

    /// Reclaimer passes performed on emergency cleanup
    pub emergency_gc_passes: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.70,
            critical_threshold: 0.85,
            emergency_threshold: 0.95,
            check_interval_ms: 30_000,
            cleanup_cooldown_ms: 30_000,
            max_history_size: 100,
            memory_limit_mb: None,
            low_water_mark: 0.50,
            idle_samples_before_backoff: 5,
            max_interval_multiplier: 4,
            trend_delta_bytes: 5 * MB,
            emergency_gc_passes: 3,
        }
    }
}

impl MonitorConfig {
    /// Check threshold ordering and bounds
    pub fn validate(&self) -> GuardResult<()> {
        let (w, c, e) = (
            self.warning_threshold,
            self.critical_threshold,
            self.emergency_threshold,
        );
        if !(0.0 < w && w < c && c < e && e <= 1.0) {
            return Err(GuardError::config(format!(
                "thresholds must satisfy 0 < warning ({w}) < critical ({c}) < emergency ({e}) <= 1"
            )));
        }
        if !(0.0..=1.0).contains(&self.low_water_mark) {
            return Err(GuardError::config("low_water_mark must be within [0, 1]"));
        }
        if self.check_interval_ms == 0 {
            return Err(GuardError::config("check_interval_ms must be positive"));
        }
        if self.max_history_size == 0 {
            return Err(GuardError::config("max_history_size must be positive"));
        }
        if self.max_interval_multiplier == 0 {
            return Err(GuardError::config("max_interval_multiplier must be at least 1"));
        }
        if self.memory_limit_mb == Some(0) {
            return Err(GuardError::config("memory_limit_mb must be positive when set"));
        }
        Ok(())
    }

    /// Base sampling interval
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Cleanup cooldown
    pub fn cleanup_cooldown(&self) -> Duration {
        Duration::from_millis(self.cleanup_cooldown_ms)
    }

    /// Configured memory limit in bytes
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit_mb.map(|mb| mb.saturating_mul(MB))
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorThresholdConfig {
    /// Errors within one window before every unit is routed to fallback
    pub max_errors: u32,

    /// Window length in milliseconds
    pub reset_interval_ms: u64,
}

impl Default for ErrorThresholdConfig {
    fn default() -> Self {
        Self {
            max_errors: 5,
            reset_interval_ms: 60_000,
        }
    }
}

impl ErrorThresholdConfig {
    /// Validate the window settings
    pub fn validate(&self) -> GuardResult<()> {
        if self.max_errors == 0 {
            return Err(GuardError::config("max_errors must be at least 1"));
        }
        if self.reset_interval_ms == 0 {
            return Err(GuardError::config("reset_interval_ms must be positive"));
        }
        Ok(())
    }
}

/// Node tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum tracked nodes before LRU eviction
    pub max_entries: usize,

    /// Normalized-text similarity at or above which two nodes are duplicates
    pub similarity_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            similarity_threshold: 0.95,
        }
    }
}

impl TrackerConfig {
    /// Validate tracker bounds
    pub fn validate(&self) -> GuardResult<()> {
        if self.max_entries == 0 {
            return Err(GuardError::config("tracker.max_entries must be positive"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(GuardError::config(
                "tracker.similarity_threshold must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Strategy selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Detection confidence below which only line-based chunking is trusted
    pub min_confidence: f64,

    /// Files smaller than this are chunked line by line
    pub small_file_bytes: usize,

    /// Files larger than this are chunked coarsely
    pub large_file_bytes: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            small_file_bytes: 256,
            large_file_bytes: 2 * MB as usize,
        }
    }
}

impl SelectorConfig {
    /// Validate size bounds
    pub fn validate(&self) -> GuardResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GuardError::config("selector.min_confidence must be within [0, 1]"));
        }
        if self.small_file_bytes >= self.large_file_bytes {
            return Err(GuardError::config(
                "selector.small_file_bytes must be below selector.large_file_bytes",
            ));
        }
        Ok(())
    }
}

/// Unit processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Deadline for one detection call
    pub detection_timeout_ms: u64,

    /// Deadline for parsing plus chunk production
    pub execution_timeout_ms: u64,

    /// Deadline for one cleanup strategy
    pub strategy_timeout_ms: u64,

    /// Deadline for the whole fallback cascade
    pub fallback_timeout_ms: u64,

    /// Cached detection results
    pub detection_cache_size: usize,

    /// Cached parse trees
    pub parse_cache_size: usize,

    /// Tiers tried, in order, by the fallback cascade
    pub fallback_tiers: Vec<ProcessingTier>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            detection_timeout_ms: 2_000,
            execution_timeout_ms: 10_000,
            strategy_timeout_ms: 5_000,
            fallback_timeout_ms: 5_000,
            detection_cache_size: 1_024,
            parse_cache_size: 64,
            fallback_tiers: vec![ProcessingTier::BracketBalanced, ProcessingTier::LineBased],
        }
    }
}

impl ProcessingConfig {
    /// Validate deadlines and cache sizes
    pub fn validate(&self) -> GuardResult<()> {
        let deadlines = [
            ("detection_timeout_ms", self.detection_timeout_ms),
            ("execution_timeout_ms", self.execution_timeout_ms),
            ("strategy_timeout_ms", self.strategy_timeout_ms),
            ("fallback_timeout_ms", self.fallback_timeout_ms),
        ];
        for (name, value) in deadlines {
            if value == 0 {
                return Err(GuardError::config(format!("processing.{name} must be positive")));
            }
        }
        if self.detection_cache_size == 0 || self.parse_cache_size == 0 {
            return Err(GuardError::config("processing cache sizes must be positive"));
        }
        Ok(())
    }

    /// Detection deadline
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    /// Execution deadline
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Per-strategy cleanup deadline
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    /// Fallback cascade deadline
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = GuardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.warning_threshold, 0.70);
        assert_eq!(config.monitor.critical_threshold, 0.85);
        assert_eq!(config.monitor.emergency_threshold, 0.95);
    }

    #[rstest]
    #[case(0.0, 0.85, 0.95)]
    #[case(0.90, 0.85, 0.95)]
    #[case(0.70, 0.95, 0.95)]
    #[case(0.70, 0.85, 1.01)]
    fn test_out_of_order_thresholds_rejected(
        #[case] warning: f64,
        #[case] critical: f64,
        #[case] emergency: f64,
    ) {
        let config = MonitorConfig {
            warning_threshold: warning,
            critical_threshold: critical,
            emergency_threshold: emergency,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GuardError::Config { .. })));
    }

    #[test]
    fn test_emergency_may_equal_one() {
        let config = MonitorConfig {
            emergency_threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_limit_conversion() {
        let config = MonitorConfig {
            memory_limit_mb: Some(2),
            ..Default::default()
        };
        assert_eq!(config.memory_limit_bytes(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempdir().expect("tempdir");
        let config = GuardConfig::load(dir.path()).expect("load");
        assert_eq!(config.errors.max_errors, 5);
    }

    #[test]
    fn test_config_round_trip_through_toml() {
        let dir = tempdir().expect("tempdir");
        let mut config = GuardConfig::default();
        config.errors.max_errors = 9;
        config.monitor.memory_limit_mb = Some(512);
        config.save(dir.path()).expect("save");

        let loaded = GuardConfig::load(dir.path()).expect("load");
        assert_eq!(loaded.errors.max_errors, 9);
        assert_eq!(loaded.monitor.memory_limit_mb, Some(512));
        assert_eq!(
            loaded.processing.fallback_tiers,
            vec![ProcessingTier::BracketBalanced, ProcessingTier::LineBased]
        );
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[errors]\nmax_errors = 2\n").expect("write");

        let loaded = GuardConfig::load_file(&path).expect("load");
        assert_eq!(loaded.errors.max_errors, 2);
        assert_eq!(loaded.errors.reset_interval_ms, 60_000);
        assert_eq!(loaded.monitor.max_history_size, 100);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "[monitor]\nwarning_threshold = 0.9\ncritical_threshold = 0.8\n",
        )
        .expect("write");

        assert!(GuardConfig::load_file(&path).is_err());
    }
}
