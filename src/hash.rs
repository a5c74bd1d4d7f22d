//! Fixed-width hash values and the FNV-1a mix used to produce them.

use core::fmt::{Debug, Display, LowerHex};
use core::hash::Hash;

/// An unsigned integer usable as a string id.
///
/// Implemented for `u32` and `u64`. The database treats the value as an
/// opaque, totally ordered key; it never recomputes it.
pub trait HashValue:
    Copy + Eq + Ord + Hash + Debug + Display + LowerHex + Send + Sync + 'static
{
    /// FNV-1a offset basis for this width.
    const FNV_BASIS: Self;

    /// Bucket index of this hash in a table of `buckets` slots.
    fn bucket(self, buckets: usize) -> usize;

    /// Widen to `u64` for diagnostics.
    fn to_u64(self) -> u64;

    /// Continue an FNV-1a hash over `bytes`.
    ///
    /// `fnv1a(a ++ b) == fnv1a(a).fnv1a_extend(b)`, which lets a prefixed
    /// string be hashed without building it.
    fn fnv1a_extend(self, bytes: &[u8]) -> Self;

    /// FNV-1a hash of `bytes`.
    #[inline]
    fn fnv1a(bytes: &[u8]) -> Self {
        Self::FNV_BASIS.fnv1a_extend(bytes)
    }
}

macro_rules! impl_hash_value {
    ($ty:ty, $basis:expr, $prime:expr) => {
        impl HashValue for $ty {
            const FNV_BASIS: Self = $basis;

            #[inline]
            fn bucket(self, buckets: usize) -> usize {
                debug_assert!(buckets > 0);
                (self as u64 % buckets as u64) as usize
            }

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn fnv1a_extend(self, bytes: &[u8]) -> Self {
                bytes
                    .iter()
                    .fold(self, |h, &b| (h ^ b as $ty).wrapping_mul($prime))
            }
        }
    };
}

impl_hash_value!(u32, 0x811c_9dc5, 0x0100_0193);
impl_hash_value!(u64, 0xcbf2_9ce4_8422_2325, 0x0000_0100_0000_01b3);
