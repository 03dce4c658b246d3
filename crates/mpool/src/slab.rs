//! Fixed-size sub-allocators backing each bucket
//!
//! A [`Slab`] hands out objects of one size. The pool only talks to the
//! trait, so any thread-safe fixed-size allocator can back a bucket; the
//! default [`SlabAllocator`] is an object cache in front of the global
//! allocator.
//!
//! # Safety
//!
//! - Objects are raw memory of `object_size()` bytes aligned to
//!   [`OBJECT_ALIGN`]; reused objects keep whatever the previous owner wrote
//! - `free_one` must receive a pointer obtained from `allocate_one` on the
//!   same slab, exactly once
//! - Dropping a slab releases only the objects sitting in its free list;
//!   objects still handed out at that point are never returned to the system

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::alloc::{alloc, dealloc};

use crossbeam_queue::SegQueue;
use tracing::trace;

use crate::error::{MpoolError, MpoolResult};

/// Alignment of every object handed out by the pool.
pub const OBJECT_ALIGN: usize = 8;

/// Fixed-size object allocator serving a single bucket
///
/// Implementations must be safe to call from many threads at once; the pool
/// adds no locking of its own. Destroying the allocator is `Drop`.
pub trait Slab: Send + Sync {
    /// Name the slab was created with
    fn name(&self) -> &str;

    /// Byte size of every object
    fn object_size(&self) -> usize;

    /// Ceiling on outstanding objects, if any
    fn limit(&self) -> Option<usize>;

    /// Hands out one object, or `None` when the slab is exhausted.
    ///
    /// The memory is not guaranteed to be zeroed.
    fn allocate_one(&self) -> Option<NonNull<u8>>;

    /// Takes back one object.
    ///
    /// # Safety
    /// - `ptr` must come from `allocate_one` on this slab
    /// - `ptr` must not be used after this call, nor freed twice
    unsafe fn free_one(&self, ptr: NonNull<u8>);

    /// Objects currently handed out
    fn outstanding(&self) -> usize;

    /// Successful allocations over the slab's lifetime
    fn total_allocations(&self) -> u64 {
        0
    }

    /// Allocation requests refused over the slab's lifetime
    fn exhausted(&self) -> u64 {
        0
    }
}

/// Creates the sub-allocator for each bucket during pool construction
pub trait SlabFactory: Send + Sync {
    /// Creates a slab for `object_size`-byte objects.
    ///
    /// `limit` caps outstanding objects; `None` means unbounded.
    fn create(&self, object_size: usize, name: &str, limit: Option<usize>) -> MpoolResult<Box<dyn Slab>>;
}

/// Factory producing [`SlabAllocator`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSlabFactory;

impl SlabFactory for DefaultSlabFactory {
    fn create(&self, object_size: usize, name: &str, limit: Option<usize>) -> MpoolResult<Box<dyn Slab>> {
        Ok(Box::new(SlabAllocator::new(object_size, name, limit)?))
    }
}

/// Object parked in a slab's free list
struct CachedObject(NonNull<u8>);

// SAFETY: A cached object is plain memory owned by the slab's free list.
// - No thread-local state is attached to the pointer
// - Only the thread that pops it from the queue touches it next
unsafe impl Send for CachedObject {}

/// Grow-on-demand object cache
///
/// Freed objects go to a lock-free free list and are handed out again before
/// any fresh memory is requested from the global allocator.
///
/// # Memory Layout
/// ```text
/// allocate_one:  free list ──pop──▶ object      (reused, not zeroed)
///                  (empty) ──alloc──▶ object    (fresh)
/// free_one:      object ──push──▶ free list
/// ```
pub struct SlabAllocator {
    name: String,
    layout: Layout,
    limit: Option<usize>,

    /// Objects returned by callers, ready for reuse
    free: SegQueue<CachedObject>,

    /// Objects currently handed out
    outstanding: AtomicUsize,

    total_allocations: AtomicU64,
    exhausted: AtomicU64,
}

impl SlabAllocator {
    /// Creates an empty slab; no memory is reserved up front.
    ///
    /// # Errors
    /// Returns a configuration error if `object_size` is zero or cannot be
    /// laid out.
    pub fn new(object_size: usize, name: &str, limit: Option<usize>) -> MpoolResult<Self> {
        if object_size == 0 {
            return Err(MpoolError::configuration(format!(
                "slab '{name}' has zero-sized objects"
            )));
        }

        let layout = Layout::from_size_align(object_size, OBJECT_ALIGN).map_err(|_| {
            MpoolError::configuration(format!("slab '{name}' object size {object_size} too large"))
        })?;

        Ok(Self {
            name: name.to_string(),
            layout,
            limit,
            free: SegQueue::new(),
            outstanding: AtomicUsize::new(0),
            total_allocations: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        })
    }

    /// Objects waiting in the free list
    pub fn cached(&self) -> usize {
        self.free.len()
    }

    /// Claims one slot against the limit.
    fn reserve(&self) -> bool {
        match self.limit {
            None => {
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(limit) => self
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < limit).then_some(current + 1)
                })
                .is_ok(),
        }
    }

    fn refuse(&self) -> Option<NonNull<u8>> {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
        trace!(slab = %self.name, outstanding = self.outstanding(), "slab exhausted");
        None
    }
}

impl Slab for SlabAllocator {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_size(&self) -> usize {
        self.layout.size()
    }

    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn allocate_one(&self) -> Option<NonNull<u8>> {
        if !self.reserve() {
            return self.refuse();
        }

        let ptr = if let Some(CachedObject(ptr)) = self.free.pop() {
            ptr
        } else {
            // SAFETY: layout has a non-zero size, checked in `new`.
            let raw = unsafe { alloc(self.layout) };
            match NonNull::new(raw) {
                Some(ptr) => ptr,
                None => {
                    self.outstanding.fetch_sub(1, Ordering::AcqRel);
                    return self.refuse();
                }
            }
        };

        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn free_one(&self, ptr: NonNull<u8>) {
        self.free.push(CachedObject(ptr));
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }

    fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

impl Drop for SlabAllocator {
    fn drop(&mut self) {
        let mut released = 0usize;

        while let Some(CachedObject(ptr)) = self.free.pop() {
            // SAFETY: every cached object was allocated in `allocate_one` with
            // `self.layout` and is owned solely by the free list.
            unsafe { dealloc(ptr.as_ptr(), self.layout) };
            released += 1;
        }

        trace!(slab = %self.name, released, outstanding = self.outstanding(), "slab destroyed");
    }
}

impl fmt::Debug for SlabAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("name", &self.name)
            .field("object_size", &self.layout.size())
            .field("limit", &self.limit)
            .field("outstanding", &self.outstanding())
            .field("cached", &self.cached())
            .finish()
    }
}
