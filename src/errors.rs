// Error Handling
//
// *La Gestion des Erreurs* (The Error Management) - Error types and non-throwing reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for LeGarde operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// LeGarde error types
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration is invalid or could not be loaded
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// Memory sampling failed
    #[error("Memory sampling failed: {0}")]
    Sampling(String),

    /// A cleanup strategy was rejected at registration
    #[error("Invalid cleanup strategy: {0}")]
    InvalidStrategy(String),

    /// A cleanup run completed with failed strategies
    #[error("Cleanup failed for {failed:?}: {message}")]
    CleanupFailed {
        /// Names of the strategies that failed
        failed: Vec<String>,
        /// Combined error message
        message: String,
    },

    /// Monitoring is disabled by configuration
    #[error("Memory monitoring is disabled")]
    MonitoringDisabled,

    /// No tokio runtime available to drive the monitor
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// Detection failed
    #[error("Detection failed: {0}")]
    Detection(String),

    /// Chunk production failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// An operation exceeded its deadline
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },
}

impl GuardError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        GuardError::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        GuardError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if this error is recoverable by retrying or degrading
    pub fn is_recoverable(&self) -> bool {
        match self {
            GuardError::Config { .. } | GuardError::InvalidStrategy(_) => false,
            GuardError::MonitoringDisabled | GuardError::NoRuntime(_) => false,
            GuardError::Sampling(_)
            | GuardError::CleanupFailed { .. }
            | GuardError::Detection(_)
            | GuardError::Execution(_)
            | GuardError::Timeout { .. } => true,
        }
    }
}

/// Severity attached to an [`ErrorReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational
    Info,
    /// Something degraded but processing continues
    Warning,
    /// An operation failed
    Error,
    /// The process is close to exhausting a resource
    Fatal,
}

/// A report about a failure that is surfaced to observers instead of being raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// How serious the condition is
    pub severity: Severity,

    /// Human readable description
    pub message: String,

    /// Where the report originated
    pub context: String,

    /// When the report was created
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    /// Create a new report stamped with the current time
    pub fn new(severity: Severity, message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            context: context.into(),
            timestamp: Utc::now(),
        }
    }

    /// Log the report at a level matching its severity
    pub fn log(&self) {
        match self.severity {
            Severity::Info => tracing::info!(context = %self.context, "{}", self.message),
            Severity::Warning => tracing::warn!(context = %self.context, "{}", self.message),
            Severity::Error | Severity::Fatal => {
                tracing::error!(severity = ?self.severity, context = %self.context, "{}", self.message)
            }
        }
    }
}
