//! Disk layer: the page-store contract and the I/O scheduler.
//!
//! The [`DiskManager`] trait is the contract the buffer pool consumes; the
//! disk manager owns the on-disk layout. The [`DiskScheduler`] converts
//! synchronous per-page calls into requests handled by a single background
//! worker, giving the pool one serialization point for all I/O.

mod error;
mod manager;
mod scheduler;

pub use error::{DiskError, DiskResult};
pub use manager::{DiskManager, FileDiskManager, MemoryDiskManager};
pub use scheduler::{Completion, CompletionWaiter, DiskRequest, DiskScheduler, PageBuffer};
