// legarde - Resource-Guarded Chunking
//
// *La Garde* (The Guard) - Memory monitoring, cleanup and circuit breaking around unit chunking

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

//! Decides, under live memory and error pressure, how one unit of source
//! content is turned into chunks, and what happens when that fails.
//!
//! [`GuardCoordinator::process_unit`] is the entry point. It never fails: the
//! worst case is a single chunk spanning the whole input.

/// Error types and non-throwing reports.
pub mod errors;

/// TOML configuration.
pub mod config;

/// Content-addressed LRU caches that cleanup strategies can flush.
pub mod cache;

/// Memory sampling, history and the adaptive monitor.
pub mod memory;

/// Cleanup strategies and their registry.
pub mod cleanup;

/// Error-rate circuit breaker.
pub mod threshold;

/// Span deduplication.
pub mod tracker;

/// Processing tier selection.
pub mod selector;

/// Language and file type detection.
pub mod detect;

/// Parser seam and the tree-sitter implementation.
pub mod parse;

/// Chunk producers.
pub mod chunk;

/// The coordinator tying everything together.
pub mod coordinator;

/// Command line front-end.
#[cfg(feature = "cli")]
pub mod cli;

pub use chunk::{Chunk, ChunkProducer, ProducerRegistry, Span};
pub use cleanup::{CleanupContext, CleanupMode, CleanupRegistry, CleanupResult, CleanupStrategy};
pub use config::GuardConfig;
pub use coordinator::{
    DegradationNotice, FallbackReason, FallbackTrigger, GuardCoordinator, GuardStatus,
    ProcessingResult,
};
pub use detect::{DetectionResult, Detector, ExtensionDetector, FileType};
pub use errors::{GuardError, Result};
pub use memory::{MemoryMonitor, MemoryStatus, PressureLevel};
pub use parse::SourceParser;
pub use selector::{ProcessingTier, StrategySelector};
pub use threshold::ErrorThreshold;
pub use tracker::NodeTracker;
