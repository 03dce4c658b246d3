//! Segmented pool implementation
//!
//! This module provides [`SegmentedPool`] and [`MpoolBuilder`]. A pool owns
//! one fixed-size sub-allocator per power-of-two bucket and routes each
//! request by element count:
//!
//! ```text
//! count ──select_bucket──▶ Bucket(i) ──▶ buckets[i].allocate_one()
//!                     └──▶ no bucket ──▶ fallback (zeroed)  or  OutOfRange
//! ```
//!
//! The pool does not record the size of what it hands out. `free` must be
//! given the same element count as the matching `allocate`.

use core::fmt;
use core::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::bucket::{MPOOL_MAX_BUCKETS, bucket_object_size, object_size, select_bucket};
use crate::config::{MPOOL_NAME_MAX, MpoolConfig};
use crate::error::{MpoolError, MpoolResult};
use crate::fallback::{FallbackAllocator, SystemFallback};
use crate::flags::AllocFlags;
use crate::slab::{DefaultSlabFactory, Slab, SlabFactory};
use crate::stats::{BucketStats, FallbackCounters, MpoolStats};

/// Where a request for a given element count is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Bucket with this index
    Bucket(usize),
    /// Fallback allocator
    Fallback,
    /// Too large for every bucket, and fallback is disabled
    Unroutable,
}

/// Builder for creating a [`SegmentedPool`] with custom configuration.
///
/// # Example
///
/// ```rust
/// use nebula_mpool::MpoolBuilder;
///
/// # fn main() -> nebula_mpool::MpoolResult<()> {
/// let pool = MpoolBuilder::new("requests")
///     .header_size(32)
///     .element_size(8)
///     .max_bucket(5)
///     .build()?;
///
/// let ptr = pool.allocate(20)?; // served by the 32-element bucket
/// unsafe { pool.free(ptr, 20)? };
/// # Ok(())
/// # }
/// ```
pub struct MpoolBuilder {
    config: MpoolConfig,
    factory: Box<dyn SlabFactory>,
    fallback: Box<dyn FallbackAllocator>,
}

impl MpoolBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Default settings:
    /// - Header: 0 bytes, element: 8 bytes
    /// - All 8 buckets, fallback enabled, no limits
    /// - Sub-allocators: [`DefaultSlabFactory`]
    /// - Fallback: [`SystemFallback`]
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self::from_config(MpoolConfig {
            name_prefix: name_prefix.into(),
            ..MpoolConfig::default()
        })
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn from_config(config: MpoolConfig) -> Self {
        Self {
            config,
            factory: Box::new(DefaultSlabFactory),
            fallback: Box::new(SystemFallback),
        }
    }

    /// Sets the fixed header size in bytes.
    #[must_use]
    pub fn header_size(mut self, header_size: usize) -> Self {
        self.config.header_size = header_size;
        self
    }

    /// Sets the per-element size in bytes.
    #[must_use]
    pub fn element_size(mut self, element_size: usize) -> Self {
        self.config.element_size = element_size;
        self
    }

    /// Sets the largest bucket index to create.
    #[must_use]
    pub fn max_bucket(mut self, max_bucket: usize) -> Self {
        self.config.max_bucket = max_bucket;
        self
    }

    /// Enables or disables the fallback allocator.
    #[must_use]
    pub fn allow_fallback(mut self, allow_fallback: bool) -> Self {
        self.config.allow_fallback = allow_fallback;
        self
    }

    /// Sets the default fallback flags.
    #[must_use]
    pub fn flags(mut self, flags: AllocFlags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Sets per-bucket limits on outstanding objects.
    #[must_use]
    pub fn limits(mut self, limits: [usize; MPOOL_MAX_BUCKETS]) -> Self {
        self.config.limits = Some(limits);
        self
    }

    /// Sets the factory creating each bucket's sub-allocator.
    #[must_use]
    pub fn slab_factory(mut self, factory: Box<dyn SlabFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Sets the allocator used for requests beyond the largest bucket.
    #[must_use]
    pub fn fallback_allocator(mut self, fallback: Box<dyn FallbackAllocator>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Builds the pool. Either every bucket is created or none is.
    pub fn build(self) -> MpoolResult<SegmentedPool> {
        SegmentedPool::with_allocators(self.config, self.factory.as_ref(), self.fallback)
    }
}

/// Size-classed object pool
///
/// Objects are a fixed header followed by a variable number of fixed-size
/// elements. Bucket `i` serves objects of `2^i` elements.
///
/// # Thread Safety
///
/// Every field is immutable after construction except the counters, which
/// are atomics, and the sub-allocators, which are thread-safe by contract.
/// `allocate` and `free` take `&self`; share the pool through an `Arc`.
///
/// # Zeroing
///
/// Bucket allocations may return previously freed memory as-is. Fallback
/// allocations are always zero-initialized.
pub struct SegmentedPool {
    /// Sub-allocator per bucket; exactly `0..=max_bucket` are populated
    buckets: [Option<Box<dyn Slab>>; MPOOL_MAX_BUCKETS],

    header_size: usize,
    element_size: usize,
    max_bucket: usize,

    allow_fallback: bool,
    flags: AllocFlags,
    fallback: Box<dyn FallbackAllocator>,
    fallback_counters: FallbackCounters,

    name: String,
}

impl SegmentedPool {
    /// Creates a pool with the default sub-allocators and fallback.
    pub fn create(config: MpoolConfig) -> MpoolResult<Self> {
        Self::with_allocators(config, &DefaultSlabFactory, Box::new(SystemFallback))
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(name_prefix: impl Into<String>) -> MpoolBuilder {
        MpoolBuilder::new(name_prefix)
    }

    /// Creates a pool with caller-supplied collaborators.
    ///
    /// # Errors
    /// - `Configuration` if the config is invalid
    /// - any error returned by `factory`
    ///
    /// On error every bucket created so far has already been destroyed.
    pub fn with_allocators(
        config: MpoolConfig,
        factory: &dyn SlabFactory,
        fallback: Box<dyn FallbackAllocator>,
    ) -> MpoolResult<Self> {
        if let Err(err) = config.validate() {
            warn!(pool = %config.name_prefix, error = %err, "invalid pool configuration");
            return Err(err);
        }

        let mut buckets: [Option<Box<dyn Slab>>; MPOOL_MAX_BUCKETS] = std::array::from_fn(|_| None);

        for (index, slot) in buckets.iter_mut().enumerate().take(config.max_bucket + 1) {
            match Self::create_bucket(&config, factory, index) {
                Ok(slab) => *slot = Some(slab),
                Err(err) => {
                    warn!(
                        pool = %config.name_prefix,
                        bucket = index,
                        error = %err,
                        "bucket creation failed, tearing down {index} created buckets"
                    );
                    // Buckets created so far are destroyed along with `buckets`.
                    return Err(err);
                }
            }
        }

        debug!(
            pool = %config.name_prefix,
            buckets = config.max_bucket + 1,
            fallback = config.allow_fallback,
            "pool created"
        );

        Ok(Self {
            buckets,
            header_size: config.header_size,
            element_size: config.element_size,
            max_bucket: config.max_bucket,
            allow_fallback: config.allow_fallback,
            flags: config.flags,
            fallback,
            fallback_counters: FallbackCounters::default(),
            name: config.name_prefix,
        })
    }

    fn create_bucket(
        config: &MpoolConfig,
        factory: &dyn SlabFactory,
        index: usize,
    ) -> MpoolResult<Box<dyn Slab>> {
        let name = config.bucket_name(index);
        if name.len() > MPOOL_NAME_MAX {
            return Err(MpoolError::configuration(format!(
                "bucket name '{name}' longer than {MPOOL_NAME_MAX} bytes"
            )));
        }

        let object_size = bucket_object_size(config.header_size, config.element_size, index)
            .ok_or_else(|| MpoolError::configuration(format!("object size overflow for bucket {index}")))?;

        let limit = config.limit(index);
        let slab = factory.create(object_size, &name, limit)?;

        debug!(bucket = index, name = %name, object_size, ?limit, "bucket created");
        Ok(slab)
    }

    /// Destroys the pool and every bucket sub-allocator.
    ///
    /// Objects still handed out are not reclaimed; what happens to them is
    /// up to the sub-allocators (the default slab leaks them).
    pub fn destroy(self) {
        drop(self);
    }

    /// Decides where a request for `count` elements is served.
    #[inline]
    pub fn route(&self, count: usize) -> Route {
        match select_bucket(count, self.max_bucket) {
            Some(index) => Route::Bucket(index),
            None if self.allow_fallback => Route::Fallback,
            None => Route::Unroutable,
        }
    }

    #[inline]
    fn slab(&self, index: usize) -> MpoolResult<&dyn Slab> {
        debug_assert!(self.buckets[index].is_some(), "bucket {index} not populated");
        self.buckets[index]
            .as_deref()
            .ok_or_else(|| MpoolError::configuration(format!("bucket {index} not populated")))
    }

    /// Allocates an object of `count` elements using the pool's default
    /// fallback flags.
    ///
    /// # Errors
    /// - `AllocationExhausted` if the bucket or fallback cannot serve it
    /// - `OutOfRange` if `count` is beyond every bucket and fallback is off
    /// - `SizeOverflow` if the fallback size does not fit in `usize`
    #[inline]
    pub fn allocate(&self, count: usize) -> MpoolResult<NonNull<u8>> {
        self.allocate_inner(count, None)
    }

    /// Allocates like [`allocate`](Self::allocate), with `flags` replacing
    /// the pool's default fallback flags for this call.
    #[inline]
    pub fn allocate_with_flags(&self, count: usize, flags: AllocFlags) -> MpoolResult<NonNull<u8>> {
        self.allocate_inner(count, Some(flags))
    }

    fn allocate_inner(&self, count: usize, flags: Option<AllocFlags>) -> MpoolResult<NonNull<u8>> {
        match self.route(count) {
            Route::Bucket(index) => {
                let slab = self.slab(index)?;
                slab.allocate_one()
                    .ok_or_else(|| MpoolError::bucket_exhausted(&self.name, index, slab.object_size()))
            }
            Route::Fallback => {
                let size = object_size(self.header_size, self.element_size, count)
                    .ok_or_else(|| MpoolError::size_overflow(count))?;
                let flags = AllocFlags::for_fallback(self.flags, flags);

                if let Some(ptr) = self.fallback.allocate(size, flags) {
                    self.fallback_counters.record_alloc();
                    trace!(pool = %self.name, count, size, "fallback allocation");
                    Ok(ptr)
                } else {
                    self.fallback_counters.record_failure();
                    trace!(pool = %self.name, count, size, "fallback allocation failed");
                    Err(MpoolError::fallback_exhausted(&self.name, size))
                }
            }
            Route::Unroutable => Err(MpoolError::out_of_range(count, self.max_bucket)),
        }
    }

    /// Returns an object to the bucket or fallback that served it.
    ///
    /// # Safety
    /// - `ptr` must come from `allocate` on this pool
    /// - `count` must be the element count it was allocated with
    /// - `ptr` must not be used after this call, nor freed twice
    ///
    /// # Errors
    /// `Misuse` if `count` routes nowhere. Nothing is released in that case.
    pub unsafe fn free(&self, ptr: NonNull<u8>, count: usize) -> MpoolResult<()> {
        match self.route(count) {
            Route::Bucket(index) => {
                let slab = self.slab(index)?;
                // SAFETY: caller guarantees ptr came from this pool with `count`,
                // which routes to the same bucket it was allocated from.
                unsafe { slab.free_one(ptr) };
                Ok(())
            }
            Route::Fallback => {
                // A count whose size overflows could never have been allocated.
                let size = object_size(self.header_size, self.element_size, count)
                    .ok_or_else(|| MpoolError::misuse(count))?;
                // SAFETY: same size the fallback allocation was made with.
                unsafe { self.fallback.free(ptr, size) };
                self.fallback_counters.record_free();
                Ok(())
            }
            Route::Unroutable => Err(MpoolError::misuse(count)),
        }
    }

    /// Name prefix of the pool
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed header size in bytes
    pub fn header_size(&self) -> usize {
        self.header_size
    }

    /// Per-element size in bytes
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Largest populated bucket index
    pub fn max_bucket(&self) -> usize {
        self.max_bucket
    }

    /// Whether oversized requests go to the fallback allocator
    pub fn allows_fallback(&self) -> bool {
        self.allow_fallback
    }

    /// Default fallback flags
    pub fn flags(&self) -> AllocFlags {
        self.flags
    }

    /// Number of populated buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.iter().filter(|slot| slot.is_some()).count()
    }

    /// Bytes an allocation of `count` elements occupies, or `None` if it
    /// cannot be served.
    pub fn object_size_for(&self, count: usize) -> Option<usize> {
        match self.route(count) {
            Route::Bucket(index) => self.buckets[index].as_deref().map(Slab::object_size),
            Route::Fallback => object_size(self.header_size, self.element_size, count),
            Route::Unroutable => None,
        }
    }

    /// Takes a statistics snapshot.
    pub fn stats(&self) -> MpoolStats {
        let mut stats = MpoolStats {
            buckets: self
                .buckets
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| slot.as_deref().map(|slab| BucketStats::from_slab(index, slab)))
                .collect(),
            ..MpoolStats::default()
        };
        self.fallback_counters.fill(&mut stats);
        stats
    }
}

impl Drop for SegmentedPool {
    fn drop(&mut self) {
        let mut destroyed = 0usize;
        for slot in &mut self.buckets {
            if let Some(slab) = slot.take() {
                drop(slab);
                destroyed += 1;
            }
        }

        debug!(pool = %self.name, buckets = destroyed, "pool destroyed");
    }
}

impl fmt::Debug for SegmentedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedPool")
            .field("name", &self.name)
            .field("header_size", &self.header_size)
            .field("element_size", &self.element_size)
            .field("max_bucket", &self.max_bucket)
            .field("allow_fallback", &self.allow_fallback)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Destroys a pool handle; `None` is a no-op.
pub fn destroy_pool(pool: Option<SegmentedPool>) {
    if let Some(pool) = pool {
        pool.destroy();
    }
}
