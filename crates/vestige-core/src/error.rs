//! Error types shared across the image-virtualization layer

use thiserror::Error;

/// The main error type for vestige operations
///
/// The taxonomy matters for forensic callers: `InvalidFormat` means "not an
/// instance of this format, try another decoder", while `Corrupt` means a
/// checksum or declared extent failed to verify and must be reported, never
/// silently accepted.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying reader or writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input does not carry this format's signature
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A checksum failed to verify or a declared size does not match
    /// the actual extent
    #[error("Corrupt evidence: {0}")]
    Corrupt(String),

    /// A required segment file is missing
    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    /// Segment index outside the scanned range
    #[error("Segment index {index} out of range (have {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Unsupported format variant or feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias for vestige operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid format error
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create a corrupt evidence error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }

    /// Create a segment not found error
    pub fn segment_not_found(msg: impl Into<String>) -> Self {
        Error::SegmentNotFound(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }

    /// True when this error reports corrupted evidence rather than a
    /// format mismatch or plain I/O failure
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }
}
