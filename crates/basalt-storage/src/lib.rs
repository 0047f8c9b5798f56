//! # basalt-storage
//!
//! The storage-engine core of BasaltDB: a buffer pool manager over a fixed
//! set of in-memory page frames, backed by a disk-resident page store.
//!
//! The crate is organized around four collaborators:
//!
//! - [`disk::DiskManager`]: the contract for reading and writing fixed-size
//!   pages by page ID
//! - [`disk::DiskScheduler`]: a single background worker that serializes all
//!   page I/O through a FIFO queue
//! - [`buffer::LruKReplacer`]: the LRU-K replacement policy that picks
//!   eviction victims by backward k-distance
//! - [`buffer::BufferPoolManager`]: the pool itself, which hands out RAII
//!   [`buffer::PageReadGuard`]s and [`buffer::PageWriteGuard`]s as the only
//!   way to touch page data
//!
//! All caller-facing I/O is blocking: callers wait on per-request completion
//! signals, and all synchronization is ordinary thread-blocking on latches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod disk;
