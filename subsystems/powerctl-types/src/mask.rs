//! Membership bitmaps over domains and sensors.

use crate::ids::{DomainId, SensorId};

/// Macro to create a 32-bit membership mask over an index type
macro_rules! define_mask {
    ($name:ident, $index:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// No members
            pub const EMPTY: Self = Self(0);

            /// Create from raw bits
            #[inline]
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Raw bits
            #[inline(always)]
            pub const fn bits(&self) -> u32 {
                self.0
            }

            /// Is `index` a member
            #[inline(always)]
            pub const fn contains(&self, index: $index) -> bool {
                index.0 < 32 && self.0 & index.bit() != 0
            }

            /// Add `index`
            #[inline(always)]
            pub fn insert(&mut self, index: $index) {
                self.0 |= index.bit();
            }

            /// Remove `index`
            #[inline(always)]
            pub fn remove(&mut self, index: $index) {
                self.0 &= !index.bit();
            }

            /// Lowest-numbered member
            #[inline]
            pub const fn first(&self) -> Option<$index> {
                if self.0 == 0 {
                    None
                } else {
                    Some(<$index>::new(self.0.trailing_zeros() as u8))
                }
            }

            /// Return a copy with `index` added
            #[inline]
            pub const fn with(self, index: $index) -> Self {
                Self(self.0 | index.bit())
            }

            #[inline(always)]
            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }

            /// Number of members
            #[inline(always)]
            pub const fn count(&self) -> u32 {
                self.0.count_ones()
            }

            /// Iterate over members in ascending order
            pub fn iter(&self) -> impl Iterator<Item = $index> {
                let bits = self.0;
                (0..32u8).filter(move |i| bits & (1u32 << i) != 0).map(<$index>::new)
            }
        }
    };
}

define_mask!(DomainMask, DomainId, "Set of domains, one bit per domain index");
define_mask!(SensorMask, SensorId, "Set of thermal sensors, one bit per sensor index");

// ============================================================================
// TESTS
// ============================================================================
