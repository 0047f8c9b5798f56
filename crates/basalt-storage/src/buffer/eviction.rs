//! LRU-K eviction policy for the buffer pool.
//!
//! LRU-K tracks the last `k` access timestamps per frame and evicts the
//! frame with the largest *backward k-distance*: the age of the k-th most
//! recent access. Frames with fewer than `k` recorded accesses have
//! infinite distance and are evicted first, tie-broken by earliest first
//! access. This distinguishes genuinely hot pages from pages touched a few
//! times in a burst, and lets sequential scans opt out of history updates
//! entirely so they do not displace hot pages.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::frame::FrameId;

/// The kind of access being recorded against a frame.
///
/// Only [`AccessType::Scan`] changes behavior: scan accesses leave the
/// frame's history untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    /// Unclassified access.
    #[default]
    Unknown,
    /// Point lookup.
    Lookup,
    /// Sequential scan; excluded from the access history.
    Scan,
    /// Index traversal.
    Index,
}

/// Access history for one tracked frame.
#[derive(Debug, Default)]
struct LruKNode {
    /// Last `k` access timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether this frame may be chosen as an eviction victim.
    is_evictable: bool,
}

#[derive(Debug, Default)]
struct ReplacerInner {
    nodes: HashMap<FrameId, LruKNode>,
    /// Monotone logical clock; advanced on every recorded access.
    current_ts: u64,
    /// Number of nodes currently marked evictable.
    evictable: usize,
}

/// LRU-K replacement policy over the pool's frames.
///
/// All operations take a single internal lock; the replacer is purely
/// in-memory and performs no I/O. Out-of-range frame IDs and removal of a
/// non-evictable frame are programmer errors and panic.
pub struct LruKReplacer {
    inner: Mutex<ReplacerInner>,
    k: usize,
    capacity: usize,
}

impl LruKReplacer {
    /// Creates a replacer for a pool of `num_frames` frames with the given
    /// backward k-distance.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "k must be at least 1");
        Self {
            inner: Mutex::new(ReplacerInner::default()),
            k,
            capacity: num_frames,
        }
    }

    /// Records an access to a frame at the current timestamp.
    ///
    /// Creates the tracking node on first access. Scan accesses leave the
    /// history untouched so scans cannot displace hot pages.
    pub fn record_access(&self, frame_id: FrameId, access: AccessType) {
        self.check_frame(frame_id);
        let inner = &mut *self.inner.lock();
        let ts = inner.current_ts;
        let node = inner.nodes.entry(frame_id).or_default();
        if !matches!(access, AccessType::Scan) {
            if node.history.len() == self.k {
                node.history.pop_front();
            }
            node.history.push_back(ts);
            inner.current_ts += 1;
        }
    }

    /// Marks a frame as evictable or not.
    ///
    /// Idempotent with respect to an already-set flag. A frame that is not
    /// tracked (already evicted or removed) is left alone: the caller's
    /// view of the frame is stale and there is nothing to mark.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame(frame_id);
        let inner = &mut *self.inner.lock();
        let changed = match inner.nodes.get_mut(&frame_id) {
            Some(node) if node.is_evictable != evictable => {
                node.is_evictable = evictable;
                true
            }
            _ => false,
        };
        if changed {
            if evictable {
                inner.evictable += 1;
            } else {
                inner.evictable -= 1;
            }
        }
    }

    /// Picks and removes the eviction victim, if any frame is evictable.
    ///
    /// The victim is the evictable frame with the largest backward
    /// k-distance. Frames with fewer than `k` recorded accesses have
    /// infinite distance and beat every finite distance; ties within that
    /// group break by earliest first access. On success the frame is no
    /// longer tracked at all.
    pub fn evict(&self) -> Option<FrameId> {
        let inner = &mut *self.inner.lock();
        let now = inner.current_ts;

        let mut victim: Option<(FrameId, bool, u64)> = None;
        for (&frame_id, node) in &inner.nodes {
            if !node.is_evictable {
                continue;
            }
            let (inf, distance) = match node.history.front() {
                // Never recorded (scan-only): infinitely old.
                None => (true, u64::MAX),
                Some(&first) if node.history.len() < self.k => (true, now - first),
                Some(&kth) => (false, now - kth),
            };
            let better = match victim {
                None => true,
                Some((_, v_inf, v_dist)) => (inf, distance) > (v_inf, v_dist),
            };
            if better {
                victim = Some((frame_id, inf, distance));
            }
        }

        let (frame_id, _, _) = victim?;
        inner.nodes.remove(&frame_id);
        inner.evictable -= 1;
        Some(frame_id)
    }

    /// Forcibly erases a tracked frame.
    ///
    /// A no-op when the frame is untracked. Removing a non-evictable frame
    /// is a programmer error and panics.
    pub fn remove(&self, frame_id: FrameId) {
        let inner = &mut *self.inner.lock();
        match inner.nodes.get(&frame_id) {
            None => return,
            Some(node) => {
                assert!(
                    node.is_evictable,
                    "removed non-evictable frame {frame_id:?} from the replacer"
                );
            }
        }
        inner.nodes.remove(&frame_id);
        inner.evictable -= 1;
    }

    /// Returns the number of currently-evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable
    }

    fn check_frame(&self, frame_id: FrameId) {
        assert!(
            frame_id.index() < self.capacity,
            "frame {frame_id:?} out of range for a pool of {} frames",
            self.capacity
        );
    }
}

impl std::fmt::Debug for LruKReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruKReplacer")
            .field("k", &self.k)
            .field("tracked", &inner.nodes.len())
            .field("evictable", &inner.evictable)
            .finish()
    }
}
