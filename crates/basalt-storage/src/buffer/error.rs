//! Buffer pool errors.

use thiserror::Error;

use crate::disk::DiskError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur inside the buffer pool.
///
/// Only scarce-resource and not-present conditions are recoverable; the
/// public API surfaces them as `Option`/`bool`. Programmer errors (invalid
/// frame IDs, removing a non-evictable frame) panic instead of appearing
/// here.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },

    /// No free frame and no evictable victim.
    #[error("no free frames available, all pages are pinned")]
    NoFreeFrames,

    /// Disk I/O failure surfaced from the scheduler.
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error that can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoFreeFrames)
    }
}
