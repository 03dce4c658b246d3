//! Generic allocator used for requests beyond the largest bucket

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc, alloc_zeroed, dealloc};

use crate::flags::AllocFlags;
use crate::slab::OBJECT_ALIGN;

/// Variable-size allocator the pool falls back to
///
/// The pool always passes [`AllocFlags::ZEROED`], so implementations must
/// return zero-initialized memory for those requests.
pub trait FallbackAllocator: Send + Sync {
    /// Allocates `size` bytes, or returns `None` if the request cannot be met.
    fn allocate(&self, size: usize, flags: AllocFlags) -> Option<NonNull<u8>>;

    /// Releases memory returned by `allocate`.
    ///
    /// # Safety
    /// - `ptr` must come from `allocate` on this allocator with the same `size`
    /// - `ptr` must not be used after this call, nor freed twice
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// Fallback backed by the global allocator
///
/// `HIGH_MEMORY` and `NO_WAIT` have no meaning for the global allocator and
/// are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFallback;

impl SystemFallback {
    #[inline]
    fn layout(size: usize) -> Option<Layout> {
        if size == 0 {
            return None;
        }
        Layout::from_size_align(size, OBJECT_ALIGN).ok()
    }
}

impl FallbackAllocator for SystemFallback {
    fn allocate(&self, size: usize, flags: AllocFlags) -> Option<NonNull<u8>> {
        let layout = Self::layout(size)?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe {
            if flags.contains(AllocFlags::ZEROED) {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };

        NonNull::new(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = Self::layout(size) {
            // SAFETY: caller guarantees ptr came from `allocate` with this size,
            // which used the same layout.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_allocation() {
        let fallback = SystemFallback;
        let ptr = fallback.allocate(4096, AllocFlags::ZEROED).unwrap();

        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 4096) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(ptr.as_ptr() as usize % OBJECT_ALIGN, 0);

        unsafe { fallback.free(ptr, 4096) };
    }

    #[test]
    fn test_zero_size_refused() {
        assert!(SystemFallback.allocate(0, AllocFlags::ZEROED).is_none());
    }

    #[test]
    fn test_unsatisfiable_size_refused() {
        assert!(SystemFallback.allocate(usize::MAX, AllocFlags::ZEROED).is_none());
    }
}
