//! Typed Identifiers
//!
//! Power domains and thermal sensors are both addressed by small indices.
//! Each gets its own newtype so a sensor index can never be used where a
//! domain index is expected.

/// Macro to create type-safe indices
#[macro_export]
macro_rules! define_index {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(pub u8);

        impl $name {
            /// Create a new index
            #[inline]
            pub const fn new(index: u8) -> Self {
                Self(index)
            }

            /// Get the raw value
            #[inline]
            pub const fn raw(&self) -> u8 {
                self.0
            }

            /// Get the value as a slice index
            #[inline]
            pub const fn index(&self) -> usize {
                self.0 as usize
            }

            /// Bit for this index in a 32-bit membership mask (0 if out of range)
            #[inline]
            pub const fn bit(&self) -> u32 {
                match 1u32.checked_shl(self.0 as u32) {
                    Some(bit) => bit,
                    None => 0,
                }
            }
        }

        impl From<u8> for $name {
            fn from(index: u8) -> Self {
                Self(index)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// ============================================================================
// INDICES
// ============================================================================

define_index!(DomainId, "Independently power/clock/voltage gated partition");
define_index!(SensorId, "Thermal sensor feeding the governor");

// ============================================================================
// TESTS
// ============================================================================
