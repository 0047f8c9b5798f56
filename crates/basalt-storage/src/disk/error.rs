//! Disk layer errors.

use std::io;

use basalt_common::types::PageId;
use thiserror::Error;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur in the disk layer.
///
/// Disk errors are values, not process-level events: the scheduler's worker
/// thread reports them through the request's completion signal and keeps
/// running.
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error from the underlying file.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: io::Error,
    },

    /// The page was never allocated on disk.
    #[error("page {page_id} is not allocated on disk")]
    PageNotAllocated {
        /// The offending page ID.
        page_id: PageId,
    },

    /// The request was dropped before the worker completed it.
    #[error("disk request was dropped before completion")]
    Cancelled,

    /// An injected fault (testing only).
    #[error("injected disk fault")]
    Faulted,
}
