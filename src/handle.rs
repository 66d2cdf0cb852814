//! Strong-typed handles for resources, passes, and views.
//!
//! Three distinct newtypes so that mixing a resource handle with a pass
//! handle is a compile-time error rather than a runtime bug.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Sentinel value for an invalid or unallocated handle/descriptor index.
pub const INVALID: u32 = 0xFFFF_FFFF;

/// Debug-fill pattern recognised by the alias/lifetime analyzer as an
/// uninitialized-memory marker rather than a legitimate handle.
pub const DEBUG_FILL_PATTERN: u32 = 0xBEBE_BEBE;

macro_rules! define_handle {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(INVALID);

            pub fn is_valid(self) -> bool {
                self.0 != INVALID
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(INVALID)", stringify!($name))
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::INVALID
            }
        }
    };
}

define_handle!(ResourceHandle, "Strongly-typed handle to a resource descriptor.");
define_handle!(PassHandle, "Strongly-typed handle to a pass.");

/// A view index. Unlike resource/pass handles, view index 0 is a normal,
/// valid value (the default/primary view), so it does not reuse the
/// INVALID-sentinel convention.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct ViewIndex(pub u32);

impl ViewIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonically increasing counter that mints dense, never-reused handles
/// within a single build. Handles start at 1; 0 is never minted so that a
/// default-constructed handle (0) is visibly distinct from any minted one,
/// though the actual "unallocated" sentinel used throughout the crate is
/// [`INVALID`].
#[derive(Default)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        HandleAllocator { next: 1 }
    }

    pub fn mint(&mut self) -> u32 {
        let v = self.next;
        debug_assert!(v != INVALID, "handle allocator exhausted");
        self.next += 1;
        v
    }
}

/// A composite key over a (resource, view) pair, as used by the state
/// tracker and the per-view resource mapping. Folds both components
/// through a multiply-rotate mixer rather than a naive XOR-shift.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ResourceViewKey(pub ResourceHandle, pub ViewIndex);

impl ResourceViewKey {
    pub fn new(resource: ResourceHandle, view: ViewIndex) -> Self {
        ResourceViewKey(resource, view)
    }

    /// A 64-bit mixed hash of the pair, independent of `std`'s default
    /// hasher (useful for cache-key style combination, see `cache.rs`).
    pub fn mix(&self) -> u64 {
        mix64(((self.0 .0 as u64) << 32) | self.1 .0 as u64)
    }
}

/// multiply-rotate 64-bit mixer (splitmix64 finalizer), used anywhere a
/// well-mixed combination of two small integers is needed.
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x
}

/// Order-independent hash of two resource handles, used by compatibility
/// checks that should not care which operand is `a` and which is `b`.
pub fn unordered_pair_hash<H: Hasher + Default>(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = H::default();
    lo.hash(&mut hasher);
    hi.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_default_to_invalid() {
        assert!(!ResourceHandle::default().is_valid());
        assert!(!PassHandle::default().is_valid());
    }

    #[test]
    fn allocator_mints_dense_increasing_handles() {
        let mut alloc = HandleAllocator::new();
        assert_eq!(alloc.mint(), 1);
        assert_eq!(alloc.mint(), 2);
        assert_eq!(alloc.mint(), 3);
    }

    #[test]
    fn pair_hash_is_order_independent() {
        let h1 = unordered_pair_hash::<fxhash::FxHasher>(3, 9);
        let h2 = unordered_pair_hash::<fxhash::FxHasher>(9, 3);
        assert_eq!(h1, h2);
    }

    #[test]
    fn resource_view_key_mix_is_deterministic() {
        let k = ResourceViewKey::new(ResourceHandle(4), ViewIndex(1));
        assert_eq!(k.mix(), k.mix());
    }
}
