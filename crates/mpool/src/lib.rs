//! # nebula-mpool
//!
//! Size-classed object pool for records made of a fixed header followed by a
//! variable number of fixed-size elements.
//!
//! A pool owns up to eight buckets. Bucket `i` serves objects with room for
//! `2^i` elements (1, 2, 4 ... 128), each backed by its own fixed-size
//! sub-allocator. Requests beyond the largest bucket either go to a
//! zero-initializing fallback allocator or fail, depending on configuration.
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_mpool::prelude::*;
//!
//! # fn main() -> MpoolResult<()> {
//! // 16-byte header, 8-byte elements, all buckets, fallback enabled
//! let pool = SegmentedPool::create(MpoolConfig::new("io_req", 16, 8))?;
//!
//! let small = pool.allocate(3)?; // bucket 2, room for 4 elements
//! let large = pool.allocate(500)?; // fallback, zeroed, 16 + 8 * 500 bytes
//!
//! unsafe {
//!     pool.free(small, 3)?;
//!     pool.free(large, 500)?;
//! }
//! pool.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`bucket`]: count to size-class mapping and object size arithmetic
//! - [`slab`]: fixed-size sub-allocators backing each bucket
//! - [`fallback`]: allocator for oversized requests
//! - [`pool`]: the pool itself and its builder
//! - [`stats`]: point-in-time counters
//! - [`error`]: error type shared by every module
//!
//! Logging goes through `tracing`; install any subscriber to see pool
//! lifecycle events.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::double_must_use)]
#![allow(clippy::return_self_not_must_use)]

pub mod bucket;
pub mod config;
pub mod error;
pub mod fallback;
pub mod flags;
pub mod pool;
pub mod slab;
pub mod stats;

pub use bucket::{MPOOL_MAX_BUCKET_INDEX, MPOOL_MAX_BUCKETS, select_bucket};
pub use config::{MPOOL_NAME_MAX, MpoolConfig};
pub use error::{MpoolError, MpoolResult};
pub use fallback::{FallbackAllocator, SystemFallback};
pub use flags::AllocFlags;
pub use pool::{MpoolBuilder, Route, SegmentedPool, destroy_pool};
pub use slab::{DefaultSlabFactory, OBJECT_ALIGN, Slab, SlabAllocator, SlabFactory};
pub use stats::{BucketStats, MpoolStats};

/// Commonly used types
pub mod prelude {
    pub use crate::config::MpoolConfig;
    pub use crate::error::{MpoolError, MpoolResult};
    pub use crate::flags::AllocFlags;
    pub use crate::pool::{MpoolBuilder, Route, SegmentedPool};
    pub use crate::stats::MpoolStats;
}
