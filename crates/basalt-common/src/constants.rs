//! System-wide constants for BasaltDB.

// =============================================================================
// Page Constants
// =============================================================================

/// Page size in bytes (4 KB).
///
/// Every page on disk and every frame in the buffer pool is exactly this
/// size. The disk manager owns the on-disk layout; the rest of the system
/// only ever sees whole pages.
pub const PAGE_SIZE: usize = 4 * 1024;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_FRAMES: usize = 128;

/// Default backward k-distance for the LRU-K replacer.
pub const DEFAULT_LRUK_K: usize = 2;

/// Smallest permitted `k` for the LRU-K replacer.
pub const MIN_LRUK_K: usize = 1;
