//! The accelerator-resident radix engine.
//!
//! Operations come in pairs, the way the accelerator API is shaped: a
//! `scratch_*` step allocates the device buffers and resident lookup tables
//! for one operation shape (block count and parameter set), and the
//! operation itself reuses that scratch across repeated invocations. Scratch
//! buffers are exclusively owned by one logical operation at a time and must
//! be released explicitly after last use.

mod add;
mod apply_lut;
mod bitwise_op;
mod blocks;
mod comparison;
mod full_propagate;
mod lut;
mod propagation;
mod sub;

pub use apply_lut::LutApplicationBuffer;
pub use bitwise_op::{BitOpBuffer, BitOpType};
pub use comparison::{
    sign_reduction_rule, ComparisonBuffer, SignReductionBuffer, IS_EQUAL, IS_INFERIOR,
    IS_SUPERIOR,
};
pub use full_propagate::FullPropagationBuffer;
pub use propagation::PropagationBuffer;

use crate::backend::AccelBackend;
use crate::parameters::RadixAccelParameters;
use std::ops::Range;

/// Engine front-end: one instance per backend and parameter set.
///
/// Every public operation takes the device-index/stream set explicitly and
/// completes on its first stream, except the lookup-table application
/// pipeline and the block primitives which may partition batched work across
/// the full set.
pub struct RadixEngine<B: AccelBackend> {
    backend: B,
    params: RadixAccelParameters,
}

impl<B: AccelBackend> RadixEngine<B> {
    pub fn new(backend: B, params: RadixAccelParameters) -> Self {
        params
            .validate()
            .unwrap_or_else(|err| panic!("invalid engine parameters: {err}"));
        Self { backend, params }
    }

    pub fn parameters(&self) -> &RadixAccelParameters {
        &self.params
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }
}

/// Splits a batch of `num_blocks` blocks into one contiguous range per
/// active device; devices beyond the block count get no work.
pub(crate) fn blocks_per_device(num_blocks: usize, device_count: usize) -> Vec<Range<usize>> {
    assert!(device_count > 0);
    let active = device_count.min(num_blocks).max(1);
    let chunk = num_blocks.div_ceil(active);
    (0..active)
        .map(|i| (i * chunk).min(num_blocks)..((i + 1) * chunk).min(num_blocks))
        .filter(|range| !range.is_empty())
        .collect()
}

/// Splits a flat block buffer into disjoint mutable per-range sub-slices.
/// The ranges must be contiguous and ascending, as produced by
/// [`blocks_per_device`].
pub(crate) fn split_blocks_mut<'a>(
    mut flat: &'a mut [u64],
    block_size: usize,
    ranges: &[Range<usize>],
) -> Vec<&'a mut [u64]> {
    let mut parts = Vec::with_capacity(ranges.len());
    let mut consumed = 0;
    for range in ranges {
        debug_assert_eq!(range.start, consumed);
        let (head, tail) = std::mem::take(&mut flat).split_at_mut(range.len() * block_size);
        parts.push(head);
        flat = tail;
        consumed = range.end;
    }
    parts
}

/// `ceil(log2(n))` for `n >= 1`.
pub(crate) fn ceil_ilog2(n: usize) -> u32 {
    n.next_power_of_two().trailing_zeros()
}
