//! RAII page guards - the only way to touch page data.
//!
//! A guard pins its frame and holds the frame's reader/writer latch for
//! its whole lifetime: readers of the same page proceed in parallel, a
//! writer excludes everyone, and distinct pages never contend. Dropping
//! the guard releases the latch, unpins the frame, and re-marks it
//! evictable once the last pin is gone.
//!
//! Guards are move-only values that only [`BufferPoolManager`] can
//! construct. Rust ownership does the rest: a moved-from guard does not
//! exist, `Drop` runs exactly once, and "declare now, assign later" is
//! `Option<PageReadGuard>` - so double releases and uses of a dead guard
//! are unrepresentable rather than runtime-checked.
//!
//! [`BufferPoolManager`]: crate::buffer::BufferPoolManager

use std::sync::Arc;

use basalt_common::types::PageId;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock};

use super::eviction::LruKReplacer;
use super::frame::{FrameHeader, FrameId};
use super::pool::PoolState;

type FrameReadGuard = ArcRwLockReadGuard<RawRwLock, Vec<u8>>;
type FrameWriteGuard = ArcRwLockWriteGuard<RawRwLock, Vec<u8>>;

/// Unpins the frame and, when the last pin is gone, re-marks it evictable.
///
/// The caller must have already released the frame latch. The pin-count
/// decrement is lock-free; the pool latch is taken only when the count
/// reaches zero. The pin count is re-checked under the pool latch: between
/// the decrement and the lock the frame may have been deleted, evicted, or
/// re-pinned for another page, in which case evictability is not ours to
/// decide any more.
fn unpin_frame(frame: &FrameHeader, replacer: &LruKReplacer, pool_latch: &Mutex<PoolState>) {
    if frame.unpin() == 0 {
        let _latch = pool_latch.lock();
        if frame.pin_count() == 0 {
            replacer.set_evictable(frame.frame_id(), true);
        }
    }
}

/// Shared (read-only) guard over one page of data.
///
/// Any number of read guards may coexist on the same page across threads.
pub struct PageReadGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    /// The shared frame latch, held for the guard's lifetime.
    data: Option<FrameReadGuard>,
    replacer: Arc<LruKReplacer>,
    pool_latch: Arc<Mutex<PoolState>>,
}

impl PageReadGuard {
    /// Creates a read guard over an already-pinned frame.
    ///
    /// Blocks until the frame latch can be taken in shared mode. Must be
    /// called after the pool latch has been released (lock ordering).
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<LruKReplacer>,
        pool_latch: Arc<Mutex<PoolState>>,
    ) -> Self {
        let data = frame.buffer().read_arc();
        Self {
            page_id,
            frame,
            data: Some(data),
            replacer,
            pool_latch,
        }
    }

    /// Returns the ID of the page this guard is protecting.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().expect("frame latch held for guard lifetime")
    }

    /// Returns whether the page is dirty (modified but not yet flushed).
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        // Release the frame latch before touching the pool latch; a
        // flushing thread may hold the pool latch while its disk request
        // waits on this frame latch.
        self.data.take();
        unpin_frame(&self.frame, &self.replacer, &self.pool_latch);
    }
}

impl std::fmt::Debug for PageReadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReadGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .finish()
    }
}

/// Exclusive (read-write) guard over one page of data.
///
/// Only one write guard may exist on a page at a time, and it excludes
/// all read guards. The frame is marked dirty the first time a mutable
/// view is taken, so the eviction path can never see a mutated frame as
/// clean.
pub struct PageWriteGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    /// The exclusive frame latch, held for the guard's lifetime.
    data: Option<FrameWriteGuard>,
    replacer: Arc<LruKReplacer>,
    pool_latch: Arc<Mutex<PoolState>>,
    modified: bool,
}

impl PageWriteGuard {
    /// Creates a write guard over an already-pinned frame.
    ///
    /// Blocks until the frame latch can be taken exclusively. Must be
    /// called after the pool latch has been released (lock ordering).
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<LruKReplacer>,
        pool_latch: Arc<Mutex<PoolState>>,
    ) -> Self {
        let data = frame.buffer().write_arc();
        Self {
            page_id,
            frame,
            data: Some(data),
            replacer,
            pool_latch,
            modified: false,
        }
    }

    /// Returns the ID of the page this guard is protecting.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the frame holding the page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().expect("frame latch held for guard lifetime")
    }

    /// Returns the page data mutably, marking the frame dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        if !self.modified {
            self.modified = true;
            self.frame.set_dirty(true);
        }
        self.data
            .as_deref_mut()
            .expect("frame latch held for guard lifetime")
    }

    /// Marks the page dirty without taking a mutable view.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.modified = true;
        self.frame.set_dirty(true);
    }

    /// Returns whether the page is dirty (modified but not yet flushed).
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }

    /// Returns true if this guard took a mutable view of the page.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.data.take();
        unpin_frame(&self.frame, &self.replacer, &self.pool_latch);
    }
}

impl std::fmt::Debug for PageWriteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWriteGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame.frame_id())
            .field("modified", &self.modified)
            .finish()
    }
}
