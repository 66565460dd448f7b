use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use crossbeam_queue::SegQueue;
use tracing::trace;

use crate::config::DEFAULT_BATCH_SIZE;

static GLOBAL_POOL: LazyLock<Arc<HeaderPool>> =
    LazyLock::new(|| Arc::new(HeaderPool::new(DEFAULT_BATCH_SIZE)));

/// A fixed-capacity array of kernel `mmsghdr` records plus the per-slot
/// storage they point into (iovec lists and address buffers).
///
/// `len()` is the in-use prefix handed to the kernel; it never exceeds
/// `capacity()`. Only the batch executors write pointers into the headers,
/// and the array goes back to its pool with all of them cleared.
pub struct HeaderArray {
    pub(crate) headers: Box<[libc::mmsghdr]>,
    pub(crate) iovecs: Box<[Vec<libc::iovec>]>,
    pub(crate) names: Box<[libc::sockaddr_storage]>,
    pub(crate) len: usize,
    /// High-water mark of slots written since the last reset.
    pub(crate) packed: usize,
}

// SAFETY: the raw pointers inside `headers` point either into this array's own
// heap storage or into caller buffers that are installed by `pack` for the
// duration of a single batch operation. `reset` clears them before the array
// becomes visible to any other owner.
unsafe impl Send for HeaderArray {}

impl HeaderArray {
    pub fn new(capacity: usize) -> Self {
        Self {
            headers: (0..capacity).map(|_| zeroed_header()).collect(),
            iovecs: (0..capacity).map(|_| Vec::new()).collect(),
            // SAFETY: all-zero is a valid `sockaddr_storage`.
            names: (0..capacity).map(|_| unsafe { mem::zeroed() }).collect(),
            len: capacity,
            packed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shrink the in-use prefix. Never grows past `capacity()`.
    pub fn truncate(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    /// The in-use headers.
    pub fn headers(&self) -> &[libc::mmsghdr] {
        &self.headers[..self.len]
    }

    /// The in-use headers, for handing to the kernel.
    pub(crate) fn headers_mut(&mut self) -> &mut [libc::mmsghdr] {
        &mut self.headers[..self.len]
    }

    /// Drop every reference to caller memory and restore full length.
    pub(crate) fn reset(&mut self) {
        for header in &mut self.headers[..self.packed] {
            *header = zeroed_header();
        }
        for iovecs in &mut self.iovecs[..self.packed] {
            iovecs.clear();
        }
        self.packed = 0;
        self.len = self.capacity();
    }
}

impl std::fmt::Debug for HeaderArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderArray")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn zeroed_header() -> libc::mmsghdr {
    // SAFETY: all-zero is a valid `mmsghdr` (null pointers, zero lengths).
    unsafe { mem::zeroed() }
}

/// Reuse pool of [`HeaderArray`]s of one fixed capacity.
///
/// Acquire and release are lock-free and O(1); a warmed-up pool never
/// allocates. There is no cap on outstanding arrays: when the pool is empty a
/// new array is allocated.
pub struct HeaderPool {
    free: SegQueue<HeaderArray>,
    batch_size: usize,
    allocated: AtomicUsize,
}

impl HeaderPool {
    /// Create a pool of arrays holding `batch_size` headers each.
    ///
    /// # Panics
    /// Panics if `batch_size` is 0.
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        Self {
            free: SegQueue::new(),
            batch_size,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Process-wide pool of [`DEFAULT_BATCH_SIZE`] arrays.
    pub fn global() -> Arc<HeaderPool> {
        Arc::clone(&GLOBAL_POOL)
    }

    /// Pre-allocate `count` idle arrays.
    pub fn warm(&self, count: usize) {
        for _ in 0..count {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            self.free.push(HeaderArray::new(self.batch_size));
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fixed storage of one array: headers plus address buffers. Iovec lists
    /// grow with the messages packed into them and are not counted.
    pub fn array_bytes(&self) -> usize {
        self.batch_size
            * (mem::size_of::<libc::mmsghdr>() + mem::size_of::<libc::sockaddr_storage>())
    }

    /// Arrays currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Arrays this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Take an array out of circulation. Its contents are unspecified.
    pub fn acquire(&self) -> HeaderArray {
        if let Some(array) = self.free.pop() {
            return array;
        }
        let total = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(batch_size = self.batch_size, total, "allocating header array");
        HeaderArray::new(self.batch_size)
    }

    /// Return an array, restored to full capacity.
    ///
    /// Arrays of a different capacity are dropped rather than pooled.
    pub fn release(&self, mut array: HeaderArray) {
        if array.capacity() != self.batch_size {
            trace!(
                capacity = array.capacity(),
                batch_size = self.batch_size,
                "dropping foreign header array"
            );
            return;
        }
        array.reset();
        self.free.push(array);
    }

    /// Acquire an array that is released when the guard drops, including
    /// during unwinding.
    pub fn borrow(&self) -> PooledHeaders<'_> {
        PooledHeaders {
            pool: self,
            array: self.acquire(),
        }
    }
}

impl std::fmt::Debug for HeaderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderPool")
            .field("batch_size", &self.batch_size)
            .field("idle", &self.idle())
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// A [`HeaderArray`] on loan from a [`HeaderPool`].
pub struct PooledHeaders<'p> {
    pool: &'p HeaderPool,
    array: HeaderArray,
}

impl Deref for PooledHeaders<'_> {
    type Target = HeaderArray;

    fn deref(&self) -> &HeaderArray {
        &self.array
    }
}

impl DerefMut for PooledHeaders<'_> {
    fn deref_mut(&mut self) -> &mut HeaderArray {
        &mut self.array
    }
}

impl Drop for PooledHeaders<'_> {
    fn drop(&mut self) {
        // A zero-capacity array does not allocate.
        let array = mem::replace(&mut self.array, HeaderArray::new(0));
        self.pool.release(array);
    }
}
