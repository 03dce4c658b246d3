//! Error types for nebula-mpool
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

// ============================================================================
// Main Error Type
// ============================================================================

/// Segmented pool errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MpoolError {
    // --- Construction Errors ---
    #[error("Invalid pool configuration: {reason}")]
    Configuration { reason: String },

    // --- Allocation Errors ---
    #[error("{}", exhausted_message(.pool, .bucket, .size))]
    AllocationExhausted {
        pool: String,
        bucket: Option<usize>,
        size: usize,
    },

    #[error("Element count {count} exceeds the largest bucket (max bucket: {max_bucket}) and fallback is disabled")]
    OutOfRange { count: usize, max_bucket: usize },

    #[error("Size overflow computing allocation for {count} elements")]
    SizeOverflow { count: usize },

    // --- Deallocation Errors ---
    #[error("Cannot route free of {count} elements: no bucket and no fallback")]
    Misuse { count: usize },
}

fn exhausted_message(pool: &str, bucket: &Option<usize>, size: &usize) -> String {
    match *bucket {
        Some(index) => format!("Pool '{pool}' bucket {index} exhausted ({size} byte objects)"),
        None => format!("Pool '{pool}' fallback allocation of {size} bytes failed"),
    }
}

impl MpoolError {
    /// Check if error is retryable
    ///
    /// Only exhaustion can clear up on its own, once other objects are freed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationExhausted { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "MPOOL:CONFIG",
            Self::AllocationExhausted { bucket: Some(_), .. } => "MPOOL:BUCKET:EXHAUSTED",
            Self::AllocationExhausted { bucket: None, .. } => "MPOOL:FALLBACK:EXHAUSTED",
            Self::OutOfRange { .. } => "MPOOL:OUT_OF_RANGE",
            Self::SizeOverflow { .. } => "MPOOL:SIZE_OVERFLOW",
            Self::Misuse { .. } => "MPOOL:MISUSE",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create bucket exhausted error
    pub fn bucket_exhausted(pool: &str, bucket: usize, size: usize) -> Self {
        Self::AllocationExhausted {
            pool: pool.to_string(),
            bucket: Some(bucket),
            size,
        }
    }

    /// Create fallback exhausted error
    pub fn fallback_exhausted(pool: &str, size: usize) -> Self {
        Self::AllocationExhausted {
            pool: pool.to_string(),
            bucket: None,
            size,
        }
    }

    /// Create out of range error
    pub fn out_of_range(count: usize, max_bucket: usize) -> Self {
        Self::OutOfRange { count, max_bucket }
    }

    /// Create size overflow error
    pub fn size_overflow(count: usize) -> Self {
        Self::SizeOverflow { count }
    }

    /// Create misuse error
    pub fn misuse(count: usize) -> Self {
        Self::Misuse { count }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for pool operations
pub type MpoolResult<T> = core::result::Result<T, MpoolError>;

/// Generic result type alias
pub type Result<T> = MpoolResult<T>;

// ============================================================================
// Tests
// ============================================================================
