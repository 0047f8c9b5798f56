//! The disk manager contract and its implementations.
//!
//! The disk manager owns the on-disk page layout. Everything above it only
//! ever sees whole pages addressed by [`PageId`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use basalt_common::constants::PAGE_SIZE;
use basalt_common::types::PageId;
use parking_lot::Mutex;

use super::error::{DiskError, DiskResult};

/// The contract for a disk-resident page store.
///
/// Implementations must be safe to share across threads; the disk
/// scheduler's worker and the buffer pool call into the same instance.
pub trait DiskManager: Send + Sync {
    /// Reads the page into `buf`.
    ///
    /// A page inside the allocated region that was never written reads as
    /// zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()>;

    /// Writes `buf` out as the page's new contents.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()>;

    /// Ensures the backing store can hold every page up to and including
    /// `up_to`. Idempotent and monotone; newly grown pages read as zeroes.
    fn increase_disk_space(&self, up_to: PageId) -> DiskResult<()>;

    /// Marks a page as free on disk. Idempotent.
    ///
    /// Page IDs are never reused in this design, so implementations may
    /// treat this as a no-op.
    fn deallocate_page(&self, page_id: PageId) -> DiskResult<()>;
}

/// A file-backed disk manager.
///
/// Pages live at offset `page_id * PAGE_SIZE` in a single backing file. The
/// file grows via `set_len`, which zero-fills the new region, so a grown
/// but never-written page reads as zeroes.
pub struct FileDiskManager {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileDiskManager {
    /// Opens (or creates) the backing file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.as_u64() * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        let mut file = self.file.lock();
        let offset = Self::page_offset(page_id);
        // Reads past the current end of file yield zeroes.
        buf.fill(0);
        let len = file.metadata()?.len();
        if offset < len {
            let avail = ((len - offset) as usize).min(buf.len());
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf[..avail])?;
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn increase_disk_space(&self, up_to: PageId) -> DiskResult<()> {
        let file = self.file.lock();
        let required = Self::page_offset(up_to.next());
        if file.metadata()?.len() < required {
            file.set_len(required)?;
        }
        Ok(())
    }

    fn deallocate_page(&self, _page_id: PageId) -> DiskResult<()> {
        // Page IDs are never reused; the slot simply stays behind.
        Ok(())
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .finish()
    }
}

/// A purely in-memory disk manager for tests.
///
/// Exposes the underlying page map for inspection and supports injecting
/// I/O faults so tests can exercise the failure path through the
/// scheduler's completion channel.
#[derive(Default)]
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
    fail_next: AtomicUsize,
}

impl MemoryDiskManager {
    /// Creates an empty in-memory disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` read/write operations fail with
    /// [`DiskError::Faulted`].
    pub fn fail_next_ops(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Returns a copy of the page's current on-disk contents, if allocated.
    pub fn page(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Returns the number of allocated pages.
    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    fn take_fault(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        if self.take_fault() {
            return Err(DiskError::Faulted);
        }
        let pages = self.pages.lock();
        match pages.get(&page_id) {
            Some(page) => {
                let n = page.len().min(buf.len());
                buf[..n].copy_from_slice(&page[..n]);
                Ok(())
            }
            None => Err(DiskError::PageNotAllocated { page_id }),
        }
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        if self.take_fault() {
            return Err(DiskError::Faulted);
        }
        let mut pages = self.pages.lock();
        match pages.get_mut(&page_id) {
            Some(page) => {
                let n = page.len().min(buf.len());
                page[..n].copy_from_slice(&buf[..n]);
                Ok(())
            }
            None => Err(DiskError::PageNotAllocated { page_id }),
        }
    }

    fn increase_disk_space(&self, up_to: PageId) -> DiskResult<()> {
        let mut pages = self.pages.lock();
        for id in 0..=up_to.as_u64() {
            pages
                .entry(PageId::new(id))
                .or_insert_with(|| vec![0u8; PAGE_SIZE]);
        }
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> DiskResult<()> {
        self.pages.lock().remove(&page_id);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDiskManager")
            .field("pages", &self.page_count())
            .finish()
    }
}
