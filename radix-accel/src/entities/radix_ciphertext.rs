//! Multi-block radix ciphertexts.

use super::{Degree, DeviceLweCiphertextList};
use crate::parameters::{CarryModulus, MessageModulus, RadixAccelParameters};

/// Per-block metadata mirrored host-side while the block data lives on the
/// device.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    pub degree: Degree,
    pub message_modulus: MessageModulus,
    pub carry_modulus: CarryModulus,
}

impl BlockInfo {
    pub fn carry_is_empty(&self) -> bool {
        self.degree.get() < self.message_modulus.0
    }
}

#[derive(Debug, Clone)]
pub struct RadixCiphertextInfo {
    pub blocks: Vec<BlockInfo>,
}

impl RadixCiphertextInfo {
    pub(crate) fn after_add(&self, other: &Self) -> Self {
        Self {
            blocks: self
                .blocks
                .iter()
                .zip(other.blocks.iter())
                .map(|(left, right)| BlockInfo {
                    degree: left.degree.after_add(right.degree),
                    ..*left
                })
                .collect(),
        }
    }

    pub(crate) fn after_lookup_table(&self, lut_degree: Degree) -> Self {
        Self {
            blocks: self
                .blocks
                .iter()
                .map(|block| BlockInfo {
                    degree: lut_degree,
                    ..*block
                })
                .collect(),
        }
    }
}

/// An ordered sequence of big-LWE blocks encoding one integer, least
/// significant block first.
///
/// Every block of one radix ciphertext has the same dimension and the same
/// `(message_modulus, carry_modulus)` pair; block order is the unit the
/// propagation engine and the sign-reduction tree operate on.
#[derive(Debug)]
pub struct DeviceRadixCiphertext {
    pub d_blocks: DeviceLweCiphertextList,
    pub info: RadixCiphertextInfo,
}

impl DeviceRadixCiphertext {
    pub fn num_blocks(&self) -> usize {
        self.d_blocks.lwe_ciphertext_count()
    }

    pub fn block_carries_are_empty(&self) -> bool {
        self.info.blocks.iter().all(BlockInfo::carry_is_empty)
    }

    pub(crate) fn assert_same_shape(&self, other: &Self) {
        assert_eq!(
            self.d_blocks.lwe_dimension(),
            other.d_blocks.lwe_dimension(),
            "mismatched LWE dimension between operands ({:?} vs {:?})",
            self.d_blocks.lwe_dimension(),
            other.d_blocks.lwe_dimension()
        );
        assert_eq!(
            self.num_blocks(),
            other.num_blocks(),
            "operands must have the same number of blocks ({} vs {})",
            self.num_blocks(),
            other.num_blocks()
        );
    }
}

/// A single-block ciphertext whose value is guaranteed to be 0 or 1, used
/// for carry-out and overflow flags.
#[derive(Debug)]
pub struct DeviceBooleanBlock(pub DeviceRadixCiphertext);

impl DeviceBooleanBlock {
    /// Wraps a block the caller knows to be boolean.
    pub fn new_unchecked(ct: DeviceRadixCiphertext) -> Self {
        debug_assert_eq!(ct.num_blocks(), 1);
        Self(ct)
    }
}

pub(crate) fn block_info_for(params: &RadixAccelParameters, degree: Degree) -> BlockInfo {
    BlockInfo {
        degree,
        message_modulus: params.message_modulus,
        carry_modulus: params.carry_modulus,
    }
}
