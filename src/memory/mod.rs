// Memory Monitoring
//
// *La Mémoire* (The Memory) - Sampling, pressure classification and tiered cleanup

mod events;
mod history;
mod monitor;
mod reclaim;
mod sampler;
mod status;

pub use events::{ListenerId, ListenerSet, MonitorEvent, MonitorListener};
pub use history::MemoryHistory;
pub use monitor::{MemoryMonitor, MemoryStats, TickReport, TierAction};
pub use reclaim::{AllocatorReclaimer, NoopReclaimer, Reclaimer};
pub use sampler::{MemorySample, MemorySampler, ProcessSampler};
pub use status::{
    growth_rate, health_score, pressure_level, trend, usage_ratio, MemoryStatus, MemoryTrend,
    PressureLevel, ThresholdTier, TREND_WINDOW,
};
