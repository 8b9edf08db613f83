//! Error types for container write sessions

use thiserror::Error;

/// Result type for acquisition operations
pub type Result<T> = std::result::Result<T, AcquireError>;

/// Errors that can occur while writing an evidentiary container
///
/// Every failure here is fatal to the session: a partially written
/// container is non-recoverable and the caller restarts the acquisition.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// Write failure on the underlying segment file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writer options that cannot produce a valid container
    #[error("Invalid writer options: {0}")]
    InvalidOptions(String),

    /// The configured segment size cannot hold even one chunk plus the
    /// trailing sections
    #[error("Segment budget too small: need at least {needed} bytes, have {budget}")]
    SegmentBudget { needed: u64, budget: u64 },

    /// Failure in the underlying segment address space
    #[error("Segment space error: {0}")]
    Stream(#[from] vestige_core::Error),
}
