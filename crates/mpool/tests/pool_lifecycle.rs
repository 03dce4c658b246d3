//! Pool construction and teardown.
//!
//! Uses a recording slab factory to check that construction is
//! all-or-nothing and that destroy releases every bucket.

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nebula_mpool::prelude::*;
use nebula_mpool::{MPOOL_NAME_MAX, Slab, SlabAllocator, SlabFactory, SystemFallback, destroy_pool};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tracing_subscriber::EnvFilter;

/// Routes pool logs to the test output; set `RUST_LOG=nebula_mpool=debug`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Recording factory
// ---------------------------------------------------------------------------

/// Slab wrapper that decrements the live counter when dropped
struct TrackedSlab {
    inner: SlabAllocator,
    live: Arc<AtomicUsize>,
}

impl Drop for TrackedSlab {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Slab for TrackedSlab {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn object_size(&self) -> usize {
        self.inner.object_size()
    }

    fn limit(&self) -> Option<usize> {
        self.inner.limit()
    }

    fn allocate_one(&self) -> Option<NonNull<u8>> {
        self.inner.allocate_one()
    }

    unsafe fn free_one(&self, ptr: NonNull<u8>) {
        unsafe { self.inner.free_one(ptr) }
    }

    fn outstanding(&self) -> usize {
        self.inner.outstanding()
    }
}

#[derive(Default)]
struct RecordingFactory {
    live: Arc<AtomicUsize>,
    created: std::sync::Mutex<Vec<(String, usize, Option<usize>)>>,
    /// Creation attempt (0-based) that fails
    fail_at: Option<usize>,
    attempts: AtomicUsize,
}

impl RecordingFactory {
    fn failing_at(attempt: usize) -> Self {
        Self {
            fail_at: Some(attempt),
            ..Self::default()
        }
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn created(&self) -> Vec<(String, usize, Option<usize>)> {
        self.created.lock().unwrap().clone()
    }
}

impl SlabFactory for RecordingFactory {
    fn create(&self, object_size: usize, name: &str, limit: Option<usize>) -> MpoolResult<Box<dyn Slab>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(attempt) {
            return Err(MpoolError::configuration(format!("injected failure creating {name}")));
        }

        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), object_size, limit));
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(TrackedSlab {
            inner: SlabAllocator::new(object_size, name, limit)?,
            live: Arc::clone(&self.live),
        }))
    }
}

fn build(config: MpoolConfig, factory: &RecordingFactory) -> MpoolResult<SegmentedPool> {
    SegmentedPool::with_allocators(config, factory, Box::new(SystemFallback))
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn test_buckets_named_and_sized() {
    init_logging();
    let factory = RecordingFactory::default();
    let pool = build(MpoolConfig::new("cas_req", 16, 8), &factory).unwrap();

    let created = factory.created();
    assert_eq!(created.len(), 8);
    assert_eq!(created[0], ("cas_req_1".to_string(), 16 + 8, None));
    assert_eq!(created[3], ("cas_req_8".to_string(), 16 + 8 * 8, None));
    assert_eq!(created[7], ("cas_req_128".to_string(), 16 + 8 * 128, None));

    assert_eq!(factory.live(), 8);
    drop(pool);
    assert_eq!(factory.live(), 0);
}

#[test]
fn test_limits_forwarded_per_bucket() {
    let factory = RecordingFactory::default();
    let config = MpoolConfig {
        limits: Some([10, 20, 30, 40, 50, 60, 70, 80]),
        max_bucket: 2,
        ..MpoolConfig::new("lim", 0, 4)
    };
    let _pool = build(config, &factory).unwrap();

    let limits: Vec<_> = factory.created().into_iter().map(|(_, _, limit)| limit).collect();
    assert_eq!(limits, vec![Some(10), Some(20), Some(30)]);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
#[case(7)]
fn test_construction_is_all_or_nothing(#[case] fail_at: usize) {
    init_logging();
    let factory = RecordingFactory::failing_at(fail_at);
    let result = build(MpoolConfig::new("req", 16, 8), &factory);

    let err = result.unwrap_err();
    assert_eq!(err.code(), "MPOOL:CONFIG");
    assert_eq!(factory.created().len(), fail_at);
    assert_eq!(factory.live(), 0, "every bucket created before the failure must be destroyed");
}

#[test]
fn test_invalid_max_bucket_creates_nothing() {
    let factory = RecordingFactory::default();
    let config = MpoolConfig {
        max_bucket: 8,
        ..MpoolConfig::new("req", 16, 8)
    };

    assert!(build(config, &factory).is_err());
    assert!(factory.created().is_empty());
}

#[test]
fn test_name_too_long_creates_nothing() {
    let factory = RecordingFactory::default();
    let config = MpoolConfig::new("x".repeat(MPOOL_NAME_MAX), 16, 8);

    let err = build(config, &factory).unwrap_err();
    assert_eq!(err.code(), "MPOOL:CONFIG");
    assert!(factory.created().is_empty());
}

#[test]
fn test_builder() {
    let factory = RecordingFactory::default();
    let live = Arc::clone(&factory.live);

    let pool = MpoolBuilder::new("built")
        .header_size(24)
        .element_size(16)
        .max_bucket(4)
        .allow_fallback(false)
        .flags(AllocFlags::NO_WAIT)
        .slab_factory(Box::new(factory))
        .build()
        .unwrap();

    assert_eq!(pool.name(), "built");
    assert_eq!(pool.header_size(), 24);
    assert_eq!(pool.element_size(), 16);
    assert_eq!(pool.max_bucket(), 4);
    assert!(!pool.allows_fallback());
    assert_eq!(pool.flags(), AllocFlags::NO_WAIT);
    assert_eq!(pool.bucket_count(), 5);

    // The builder's factory is gone, the slabs it made are not.
    assert_eq!(live.load(Ordering::SeqCst), 5);
    pool.destroy();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn test_destroy_pool_handles_absent_pool() {
    destroy_pool(None);

    let factory = RecordingFactory::default();
    let pool = build(MpoolConfig::strict("req", 8, 8, 1), &factory).unwrap();
    destroy_pool(Some(pool));
    assert_eq!(factory.live(), 0);
}

#[test]
fn test_destroy_with_outstanding_objects() {
    let factory = RecordingFactory::default();
    let pool = build(MpoolConfig::new("req", 8, 8), &factory).unwrap();

    // Leaked on purpose: destroy does not validate live objects.
    let _leaked = pool.allocate(2).unwrap();
    assert_eq!(pool.stats().outstanding(), 1);

    pool.destroy();
    assert_eq!(factory.live(), 0);
}
