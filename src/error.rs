//! Error types for the KoboNFT rate limiter.

use thiserror::Error;

use crate::storage::StorageError;

/// Raised when a rate-limited operation is refused.
///
/// Carries the whole number of seconds (rounded up) until the bucket's
/// window resets.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Rate limit exceeded. Please try again in {retry_after_secs} seconds.")]
pub struct QuotaExceeded {
    /// Seconds until the window resets, rounded up
    pub retry_after_secs: u64,
}

impl QuotaExceeded {
    /// Build from the milliseconds remaining until reset.
    pub fn from_millis(reset_after_ms: u64) -> Self {
        Self {
            retry_after_secs: reset_after_ms.div_ceil(1000),
        }
    }
}

/// Main error type for KoboNFT rate limiting operations.
#[derive(Error, Debug)]
pub enum KoboError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Quota exhausted for a bucket
    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for KoboNFT rate limiting operations.
pub type Result<T> = std::result::Result<T, KoboError>;
