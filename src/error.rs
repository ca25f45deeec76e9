//! Error types for hazard-disagg
//!
//! ## Table of Contents
//! - **DisaggError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, DisaggError>`

use thiserror::Error;

/// Result type alias for disaggregation operations
pub type Result<T> = std::result::Result<T, DisaggError>;

/// Main error type for disaggregation operations
#[derive(Error, Debug)]
pub enum DisaggError {
    /// Configuration error during builder setup or settings validation
    #[error("configuration error: {0}")]
    Config(String),

    /// No hazard curve exists for a (site, IMT, realization) combination.
    /// The upstream curve phase must produce exactly one curve per
    /// combination, so this indicates corrupted calculation data.
    #[error("missing hazard curve: {0}")]
    MissingCurve(String),

    /// Failure inside the external disaggregation kernel
    #[error("kernel error: {0}")]
    Kernel(String),

    /// Storage gateway failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Task substrate failure (submission, join, or executor shutdown)
    #[error("task error: {0}")]
    Task(String),

    /// Metrics collection or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (should not occur in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

impl DisaggError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-curve error
    pub fn missing_curve(msg: impl Into<String>) -> Self {
        Self::MissingCurve(msg.into())
    }

    /// Create a kernel error
    pub fn kernel(msg: impl Into<String>) -> Self {
        Self::Kernel(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a task error
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the task substrate should re-attempt a unit that failed
    /// with this error.
    ///
    /// Kernel, storage, task and IO faults are transient as far as the
    /// substrate can tell. A missing curve is not: the upstream phase did
    /// not write the data, and re-running the unit cannot fix that.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Kernel(_) | Self::Storage(_) | Self::Task(_) | Self::Io(_)
        )
    }
}
