//! Asynchronous disk I/O scheduling.
//!
//! The scheduler owns one background worker thread and a blocking FIFO of
//! requests. Callers enqueue a [`DiskRequest`] and block on its
//! [`CompletionWaiter`]; the worker executes requests strictly in enqueue
//! order and signals each completion exactly once. The worker never dies
//! from an I/O error; failures travel back through the completion as
//! values.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use basalt_common::types::PageId;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{trace, warn};

use super::error::{DiskError, DiskResult};
use super::manager::DiskManager;

/// A shared handle to one page-sized buffer.
///
/// Requests carry a handle to the frame's actual buffer, so reads populate
/// the frame in place and writes snapshot it under the frame latch.
pub type PageBuffer = Arc<RwLock<Vec<u8>>>;

/// One disk I/O request.
pub struct DiskRequest {
    /// `true` for a write (buffer to disk), `false` for a read (disk to
    /// buffer).
    pub is_write: bool,
    /// The page to read or write.
    pub page_id: PageId,
    /// The buffer to read into or write from.
    pub data: PageBuffer,
    /// Signalled exactly once when the worker finishes the operation.
    pub completion: Completion,
}

struct CompletionState {
    result: Mutex<Option<DiskResult<()>>>,
    done: Condvar,
}

/// The signalling half of a one-shot completion.
///
/// Consumed by the scheduler's worker. Dropping an unsignalled completion
/// delivers [`DiskError::Cancelled`] so a waiter can never hang.
pub struct Completion {
    state: Arc<CompletionState>,
    signalled: bool,
}

impl Completion {
    /// Creates a linked completion pair.
    pub fn new() -> (Completion, CompletionWaiter) {
        let state = Arc::new(CompletionState {
            result: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            Completion {
                state: Arc::clone(&state),
                signalled: false,
            },
            CompletionWaiter { state },
        )
    }

    /// Delivers the result and wakes the waiter.
    pub fn signal(mut self, result: DiskResult<()>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: DiskResult<()>) {
        if self.signalled {
            return;
        }
        self.signalled = true;
        *self.state.result.lock() = Some(result);
        self.state.done.notify_all();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.deliver(Err(DiskError::Cancelled));
    }
}

/// The waiting half of a one-shot completion.
pub struct CompletionWaiter {
    state: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Blocks until the request completes and returns its result.
    pub fn wait(self) -> DiskResult<()> {
        let mut result = self.state.result.lock();
        loop {
            if let Some(outcome) = result.take() {
                return outcome;
            }
            self.state.done.wait(&mut result);
        }
    }
}

/// A thread-safe unbounded FIFO. `None` is the shutdown sentinel.
struct RequestQueue {
    items: Mutex<VecDeque<Option<DiskRequest>>>,
    available: Condvar,
}

impl RequestQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    fn put(&self, item: Option<DiskRequest>) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    fn get(&self) -> Option<DiskRequest> {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }
}

/// The disk scheduler: one worker thread draining a FIFO of requests.
///
/// Construction spawns the worker; dropping the scheduler enqueues a
/// shutdown sentinel and joins it. Requests already in the queue are
/// drained before the sentinel is reached, so every scheduled request is
/// completed.
pub struct DiskScheduler {
    disk: Arc<dyn DiskManager>,
    queue: Arc<RequestQueue>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler over the given disk manager and spawns the
    /// worker thread.
    pub fn new(disk: Arc<dyn DiskManager>) -> Self {
        let queue = Arc::new(RequestQueue::new());
        let worker_queue = Arc::clone(&queue);
        let worker_disk = Arc::clone(&disk);
        let worker = thread::Builder::new()
            .name("basalt-disk-io".to_string())
            .spawn(move || Self::worker_loop(&worker_disk, &worker_queue))
            .expect("failed to spawn disk I/O worker");
        Self {
            disk,
            queue,
            worker: Some(worker),
        }
    }

    /// Enqueues a request and returns immediately.
    ///
    /// The request's completion will be signalled exactly once after the
    /// worker finishes the underlying disk operation. Requests execute in
    /// enqueue order; there is no reordering or coalescing.
    pub fn schedule(&self, request: DiskRequest) {
        self.queue.put(Some(request));
    }

    /// Enqueues a read of `page_id` into `data` and returns the waiter.
    pub fn schedule_read(&self, page_id: PageId, data: PageBuffer) -> CompletionWaiter {
        let (completion, waiter) = Completion::new();
        self.schedule(DiskRequest {
            is_write: false,
            page_id,
            data,
            completion,
        });
        waiter
    }

    /// Enqueues a write of `data` to `page_id` and returns the waiter.
    pub fn schedule_write(&self, page_id: PageId, data: PageBuffer) -> CompletionWaiter {
        let (completion, waiter) = Completion::new();
        self.schedule(DiskRequest {
            is_write: true,
            page_id,
            data,
            completion,
        });
        waiter
    }

    /// Ensures the backing store can hold the page. Idempotent and
    /// monotone; forwarded to the disk manager without queueing.
    pub fn increase_disk_space(&self, up_to: PageId) -> DiskResult<()> {
        self.disk.increase_disk_space(up_to)
    }

    /// Marks a page as free on disk. Idempotent; forwarded to the disk
    /// manager without queueing.
    pub fn deallocate_page(&self, page_id: PageId) -> DiskResult<()> {
        self.disk.deallocate_page(page_id)
    }

    fn worker_loop(disk: &Arc<dyn DiskManager>, queue: &RequestQueue) {
        trace!("disk I/O worker started");
        while let Some(request) = queue.get() {
            let result = if request.is_write {
                let data = request.data.read();
                disk.write_page(request.page_id, &data)
            } else {
                let mut data = request.data.write();
                disk.read_page(request.page_id, &mut data)
            };
            if let Err(error) = &result {
                warn!(page_id = %request.page_id, is_write = request.is_write, %error,
                    "disk request failed");
            } else {
                trace!(page_id = %request.page_id, is_write = request.is_write,
                    "disk request completed");
            }
            request.completion.signal(result);
        }
        trace!("disk I/O worker stopped");
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.queue.put(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for DiskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskScheduler")
            .field("queued", &self.queue.items.lock().len())
            .finish()
    }
}
