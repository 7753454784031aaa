//! Reusable scratch buffers for body capture.
//!
//! Every captured body is accumulated into a buffer taken from a [`BufferPool`]. The pool is
//! shared between all exchanges handled by a layer (and may be shared between layers); each
//! exchange owns the [`PooledBuffer`] it acquired, which goes back to the pool when dropped.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DEFAULT_MAX_POOLED: usize = 32;
const DEFAULT_INITIAL_CAPACITY: usize = 8 * 1024;
/// Buffers that grew beyond this are freed instead of being kept around.
const MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Thread-safe pool of scratch buffers.
///
/// Cloning is cheap and yields a handle to the same pool.
///
/// # Examples
///
/// ```rust
/// use http_body_logger::BufferPool;
///
/// let pool = BufferPool::new(4, 1024);
/// {
///     let mut buf = pool.acquire();
///     buf.extend_from_slice(b"hello");
/// } // returned to the pool here
/// assert_eq!(pool.idle(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    initial_capacity: usize,
    acquired: AtomicU64,
}

impl BufferPool {
    /// Create a pool keeping at most `max_pooled` idle buffers, each freshly allocated buffer
    /// starting with `initial_capacity` bytes.
    pub fn new(max_pooled: usize, initial_capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_pooled)),
                max_pooled,
                initial_capacity,
                acquired: AtomicU64::new(0),
            }),
        }
    }

    /// Take an empty buffer from the pool, allocating one if none is idle.
    pub fn acquire(&self) -> PooledBuffer {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        let buf = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.inner.initial_capacity));

        PooledBuffer {
            buf,
            pool: self.inner.clone(),
        }
    }

    /// Total number of buffers handed out since the pool was created.
    pub fn acquired(&self) -> u64 {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    /// Number of buffers currently sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED, DEFAULT_INITIAL_CAPACITY)
    }
}

/// A scratch buffer on loan from a [`BufferPool`].
///
/// Dereferences to [`BytesMut`]. Cleared and handed back to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();

        let mut free = self.pool.free.lock();
        if free.len() < self.pool.max_pooled {
            free.push(buf);
        }
    }
}
