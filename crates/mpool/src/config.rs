//! Segmented pool configuration

use crate::bucket::{MPOOL_MAX_BUCKET_INDEX, MPOOL_MAX_BUCKETS, bucket_capacity, bucket_object_size};
use crate::error::{MpoolError, MpoolResult};
use crate::flags::AllocFlags;

/// Maximum length in bytes of a bucket name (`"{prefix}_{capacity}"`).
///
/// Names that would exceed it fail construction instead of being truncated.
pub const MPOOL_NAME_MAX: usize = 127;

/// Configuration for a segmented pool
///
/// Fixed for the lifetime of the pool; there is no reconfiguration after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpoolConfig {
    /// Prefix used to derive every bucket name
    pub name_prefix: String,

    /// Fixed byte size prepended to every object
    pub header_size: usize,
    /// Byte size of one element
    pub element_size: usize,

    /// Largest bucket index to create (`< MPOOL_MAX_BUCKETS`)
    pub max_bucket: usize,

    /// Route oversized requests to the fallback allocator instead of failing
    pub allow_fallback: bool,
    /// Default flags for fallback allocations
    pub flags: AllocFlags,

    /// Per-bucket ceiling on outstanding objects (`None` means unbounded)
    pub limits: Option<[usize; MPOOL_MAX_BUCKETS]>,
}

impl Default for MpoolConfig {
    fn default() -> Self {
        Self {
            name_prefix: "mpool".to_string(),
            header_size: 0,
            element_size: 8,
            max_bucket: MPOOL_MAX_BUCKET_INDEX,
            allow_fallback: true,
            flags: AllocFlags::empty(),
            limits: None,
        }
    }
}

impl MpoolConfig {
    /// Configuration with every bucket and fallback enabled
    #[must_use]
    pub fn new(name_prefix: impl Into<String>, header_size: usize, element_size: usize) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            header_size,
            element_size,
            ..Self::default()
        }
    }

    /// Strict configuration - requests beyond `max_bucket` fail with `OutOfRange`
    #[must_use]
    pub fn strict(
        name_prefix: impl Into<String>,
        header_size: usize,
        element_size: usize,
        max_bucket: usize,
    ) -> Self {
        Self {
            max_bucket,
            allow_fallback: false,
            ..Self::new(name_prefix, header_size, element_size)
        }
    }

    /// Limit for bucket `index`, if any
    #[inline]
    pub fn limit(&self, index: usize) -> Option<usize> {
        self.limits.as_ref().and_then(|limits| limits.get(index).copied())
    }

    /// Name of bucket `index`
    pub fn bucket_name(&self, index: usize) -> String {
        format!("{}_{}", self.name_prefix, bucket_capacity(index))
    }

    /// Checks everything that can be checked before any bucket is created.
    ///
    /// Sub-allocator failures can still occur afterwards.
    pub fn validate(&self) -> MpoolResult<()> {
        if self.max_bucket >= MPOOL_MAX_BUCKETS {
            return Err(MpoolError::configuration(format!(
                "max bucket {} out of range (limit {MPOOL_MAX_BUCKET_INDEX})",
                self.max_bucket
            )));
        }

        if self.name_prefix.is_empty() {
            return Err(MpoolError::configuration("empty name prefix"));
        }

        if self.header_size == 0 && self.element_size == 0 {
            return Err(MpoolError::configuration("zero-sized objects"));
        }

        // The largest bucket has the longest name and the largest objects.
        let name = self.bucket_name(self.max_bucket);
        if name.len() > MPOOL_NAME_MAX {
            return Err(MpoolError::configuration(format!(
                "bucket name '{name}' longer than {MPOOL_NAME_MAX} bytes"
            )));
        }

        if bucket_object_size(self.header_size, self.element_size, self.max_bucket).is_none() {
            return Err(MpoolError::configuration(format!(
                "object size overflow for bucket {}",
                self.max_bucket
            )));
        }

        Ok(())
    }
}
