//! Buffer pool configuration.

use basalt_common::constants::{DEFAULT_LRUK_K, DEFAULT_POOL_FRAMES, MIN_LRUK_K};

/// Configuration for the buffer pool.
///
/// The page size is a compile-time constant
/// ([`basalt_common::constants::PAGE_SIZE`]); only the pool capacity and
/// the replacer's `k` are chosen at construction.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in the buffer pool.
    pub num_frames: usize,
    /// Backward k-distance for the LRU-K replacer.
    pub k_dist: usize,
}

impl BufferPoolConfig {
    /// Creates a new configuration with the specified number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            k_dist: DEFAULT_LRUK_K,
        }
    }

    /// Sets the replacer's backward k-distance.
    pub fn with_k_dist(mut self, k_dist: usize) -> Self {
        self.k_dist = k_dist;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.num_frames == 0 {
            return Err("num_frames must be > 0");
        }
        if self.k_dist < MIN_LRUK_K {
            return Err("k_dist must be >= 1");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_FRAMES)
    }
}
