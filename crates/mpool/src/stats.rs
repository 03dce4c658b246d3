//! Pool statistics
//!
//! Counters are relaxed atomics read one at a time, so a snapshot taken
//! while other threads allocate is approximate.

use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::bucket::bucket_capacity;
use crate::slab::Slab;

/// Snapshot of one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    /// Bucket index
    pub index: usize,
    /// Elements per object (`2^index`)
    pub capacity: usize,
    /// Sub-allocator name
    pub name: String,
    /// Bytes per object
    pub object_size: usize,
    /// Ceiling on outstanding objects
    pub limit: Option<usize>,
    /// Objects currently handed out
    pub outstanding: usize,
    /// Successful allocations
    pub total_allocations: u64,
    /// Refused allocations
    pub exhausted: u64,
}

impl BucketStats {
    pub(crate) fn from_slab(index: usize, slab: &dyn Slab) -> Self {
        Self {
            index,
            capacity: bucket_capacity(index),
            name: slab.name().to_string(),
            object_size: slab.object_size(),
            limit: slab.limit(),
            outstanding: slab.outstanding(),
            total_allocations: slab.total_allocations(),
            exhausted: slab.exhausted(),
        }
    }
}

/// Snapshot of a whole pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MpoolStats {
    /// Populated buckets, by index
    pub buckets: Vec<BucketStats>,
    /// Fallback objects currently handed out
    pub fallback_outstanding: usize,
    /// Successful fallback allocations
    pub fallback_allocations: u64,
    /// Failed fallback allocations
    pub fallback_failures: u64,
}

impl MpoolStats {
    /// Objects handed out across buckets and fallback
    pub fn outstanding(&self) -> usize {
        self.buckets.iter().map(|b| b.outstanding).sum::<usize>() + self.fallback_outstanding
    }

    /// Successful allocations across buckets and fallback
    pub fn total_allocations(&self) -> u64 {
        self.buckets.iter().map(|b| b.total_allocations).sum::<u64>() + self.fallback_allocations
    }

    /// Check if any object is still live
    pub fn has_live_objects(&self) -> bool {
        self.outstanding() > 0
    }

    /// Stats for bucket `index`, if populated
    pub fn bucket(&self, index: usize) -> Option<&BucketStats> {
        self.buckets.iter().find(|b| b.index == index)
    }
}

impl fmt::Display for MpoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        for bucket in &self.buckets {
            writeln!(
                f,
                "  [{}] {} ({} bytes): {} live, {} allocs, {} refused",
                bucket.index,
                bucket.name,
                bucket.object_size,
                bucket.outstanding,
                bucket.total_allocations,
                bucket.exhausted
            )?;
        }
        writeln!(
            f,
            "  fallback: {} live, {} allocs, {} failed",
            self.fallback_outstanding, self.fallback_allocations, self.fallback_failures
        )
    }
}

/// Live counters for the fallback path
#[derive(Debug, Default)]
pub(crate) struct FallbackCounters {
    outstanding: AtomicUsize,
    allocations: AtomicU64,
    failures: AtomicU64,
}

impl FallbackCounters {
    #[inline]
    pub(crate) fn record_alloc(&self) {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_free(&self) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut MpoolStats) {
        stats.fallback_outstanding = self.outstanding.load(Ordering::Relaxed);
        stats.fallback_allocations = self.allocations.load(Ordering::Relaxed);
        stats.fallback_failures = self.failures.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::SlabAllocator;

    #[test]
    fn test_bucket_stats_from_slab() {
        let slab = SlabAllocator::new(32, "req_4", Some(10)).unwrap();
        let ptr = slab.allocate_one().unwrap();

        let stats = BucketStats::from_slab(2, &slab);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.name, "req_4");
        assert_eq!(stats.outstanding, 1);
        assert_eq!(stats.limit, Some(10));

        unsafe { slab.free_one(ptr) };
    }

    #[test]
    fn test_totals() {
        let counters = FallbackCounters::default();
        counters.record_alloc();
        counters.record_alloc();
        counters.record_free();
        counters.record_failure();

        let mut stats = MpoolStats::default();
        counters.fill(&mut stats);

        assert_eq!(stats.fallback_outstanding, 1);
        assert_eq!(stats.fallback_allocations, 2);
        assert_eq!(stats.fallback_failures, 1);
        assert!(stats.has_live_objects());
        assert!(stats.to_string().contains("fallback: 1 live"));
    }
}
