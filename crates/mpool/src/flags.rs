//! Allocation flags handed to the fallback allocator

use bitflags::bitflags;

bitflags! {
    /// Flags controlling a fallback allocation.
    ///
    /// The pool always adds [`AllocFlags::ZEROED`] and
    /// [`AllocFlags::HIGH_MEMORY`] before calling the fallback allocator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AllocFlags: u32 {
        /// Memory must be zero-initialized.
        const ZEROED = 1 << 0;
        /// Memory may come from extended (high) memory.
        const HIGH_MEMORY = 1 << 1;
        /// The allocation must not block.
        const NO_WAIT = 1 << 2;
    }
}

impl AllocFlags {
    /// Flags forced onto every fallback allocation.
    pub const FALLBACK_REQUIRED: Self = Self::ZEROED.union(Self::HIGH_MEMORY);

    /// Effective flags for a fallback allocation: the per-call override
    /// replaces the pool default, then the required bits are added.
    #[inline]
    #[must_use]
    pub fn for_fallback(pool_default: Self, per_call: Option<Self>) -> Self {
        per_call.unwrap_or(pool_default) | Self::FALLBACK_REQUIRED
    }
}
