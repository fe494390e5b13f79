//! Ciphertext and lookup-table entities handled by the engine.

pub mod lookup_table;
pub mod lwe_ciphertext_list;
pub mod radix_ciphertext;

pub use lookup_table::{BivariateLookupTableOwned, DeviceBivariateLut, DeviceLut, LookupTableOwned};
pub use lwe_ciphertext_list::DeviceLweCiphertextList;
pub use radix_ciphertext::{BlockInfo, DeviceBooleanBlock, DeviceRadixCiphertext, RadixCiphertextInfo};

use std::cmp;

/// The maximum value a ciphertext can hold, tracked per block to know when a
/// carry buffer is clean and when packing two blocks is legal.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone)]
pub struct Degree(pub(crate) u64);

impl Degree {
    pub fn new(degree: u64) -> Self {
        Self(degree)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn after_add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    pub(crate) fn after_bitand(self, other: Self) -> Self {
        Self(cmp::min(self.0, other.0))
    }

    pub(crate) fn after_bitor(self, other: Self) -> Self {
        let max = cmp::max(self.0, other.0);
        let min = cmp::min(self.0, other.0);
        let mut result = max;
        // Try every value the smaller operand can take to find the worst case
        for i in 0..=min {
            result = cmp::max(result, max | i);
        }
        Self(result)
    }

    pub(crate) fn after_bitxor(self, other: Self) -> Self {
        let max = cmp::max(self.0, other.0);
        let min = cmp::min(self.0, other.0);
        let mut result = max;
        for i in 0..=min {
            result = cmp::max(result, max ^ i);
        }
        Self(result)
    }
}

#[cfg(test)]
mod tests {
    use super::Degree;

    #[test]
    fn bit_op_degrees_are_tight_upper_bounds() {
        assert_eq!(Degree(3).after_bitand(Degree(1)), Degree(1));
        assert_eq!(Degree(2).after_bitor(Degree(1)), Degree(3));
        assert_eq!(Degree(2).after_bitxor(Degree(2)), Degree(3));
        assert_eq!(Degree(0).after_bitxor(Degree(0)), Degree(0));
    }
}
