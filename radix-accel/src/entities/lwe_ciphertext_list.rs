//! Device-resident lists of LWE ciphertexts.

use crate::device::{DeviceVec, Stream};
use crate::parameters::LweDimension;
use std::ops::Range;

/// A flat device buffer holding `count` LWE ciphertexts of identical
/// dimension, each stored as `dimension` mask scalars followed by one body
/// scalar, over the native 2^64 ring.
///
/// Two sizes coexist in the engine: "small" lists (post-keyswitch) and "big"
/// lists (pre-keyswitch / post-bootstrap, dimension
/// `glwe_dimension * polynomial_size`).
#[derive(Debug)]
pub struct DeviceLweCiphertextList {
    d_vec: DeviceVec<u64>,
    lwe_dimension: LweDimension,
    count: usize,
}

impl DeviceLweCiphertextList {
    /// Allocates a zeroed list; every block starts as a trivial encryption
    /// of zero.
    pub fn new(stream: &Stream, lwe_dimension: LweDimension, count: usize) -> Self {
        Self {
            d_vec: DeviceVec::new(lwe_dimension.to_lwe_size() * count, stream),
            lwe_dimension,
            count,
        }
    }

    pub fn lwe_dimension(&self) -> LweDimension {
        self.lwe_dimension
    }

    pub fn lwe_size(&self) -> usize {
        self.lwe_dimension.to_lwe_size()
    }

    pub fn lwe_ciphertext_count(&self) -> usize {
        self.count
    }

    pub fn device_index(&self) -> crate::device::DeviceIndex {
        self.d_vec.device_index()
    }

    pub(crate) fn as_flat(&self) -> &[u64] {
        self.d_vec.as_slice()
    }

    pub(crate) fn as_flat_mut(&mut self) -> &mut [u64] {
        self.d_vec.as_mut_slice()
    }

    pub(crate) fn block(&self, index: usize) -> &[u64] {
        let size = self.lwe_size();
        &self.d_vec.as_slice()[index * size..(index + 1) * size]
    }

    pub(crate) fn block_mut(&mut self, index: usize) -> &mut [u64] {
        let size = self.lwe_size();
        &mut self.d_vec.as_mut_slice()[index * size..(index + 1) * size]
    }

    pub(crate) fn blocks(&self, range: Range<usize>) -> &[u64] {
        let size = self.lwe_size();
        &self.d_vec.as_slice()[range.start * size..range.end * size]
    }

    pub(crate) fn blocks_mut(&mut self, range: Range<usize>) -> &mut [u64] {
        let size = self.lwe_size();
        &mut self.d_vec.as_mut_slice()[range.start * size..range.end * size]
    }

    /// Copies `src[src_blocks]` into `self` starting at block `dst_start`.
    /// `self` and `src` are distinct lists by construction.
    pub fn copy_blocks_async(
        &mut self,
        dst_start: usize,
        src: &Self,
        src_blocks: Range<usize>,
        stream: &Stream,
    ) {
        assert_eq!(
            self.lwe_dimension, src.lwe_dimension,
            "block copy: mismatched LWE dimensions ({:?} vs {:?})",
            self.lwe_dimension, src.lwe_dimension
        );
        let size = self.lwe_size();
        self.d_vec.copy_src_range_async(
            dst_start * size,
            &src.d_vec,
            src_blocks.start * size..src_blocks.end * size,
            stream,
        );
    }

    /// Overwrites the selected blocks with trivial encryptions of zero.
    pub fn zero_blocks_async(&mut self, blocks: Range<usize>, stream: &Stream) {
        let size = self.lwe_size();
        self.d_vec
            .memset_range_async(blocks.start * size..blocks.end * size, 0, stream);
    }
}
