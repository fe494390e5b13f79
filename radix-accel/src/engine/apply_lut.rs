//! The keyswitch → bootstrap pipeline, batched over radix blocks and
//! partitioned across the device set.

use super::{blocks_per_device, split_blocks_mut, RadixEngine};
use crate::backend::AccelBackend;
use crate::device::{launch_abort, DeviceStreams};
use crate::entities::{
    DeviceBivariateLut, DeviceLut, DeviceLweCiphertextList, DeviceRadixCiphertext,
    LookupTableOwned,
};
use crate::parameters::{LweDimension, RadixAccelParameters};
use rayon::prelude::*;

/// Scratch for the lookup-table application pipeline: one small-LWE staging
/// list receiving keyswitch outputs and one big-LWE staging list used as the
/// packing target of bivariate applications.
///
/// Created once per operation shape and reused across invocations; released
/// explicitly. Reusing it after release, or for a larger batch than it was
/// sized for, aborts.
pub struct LutApplicationBuffer {
    pub(crate) small_staging: DeviceLweCiphertextList,
    pub(crate) big_staging: DeviceLweCiphertextList,
    max_blocks: usize,
    released: bool,
}

impl LutApplicationBuffer {
    pub fn new(streams: &DeviceStreams, params: &RadixAccelParameters, max_blocks: usize) -> Self {
        tracing::debug!(
            max_blocks,
            lwe_dimension = params.lwe_dimension.0,
            big_lwe_dimension = params.big_lwe_dimension().0,
            "allocating lut application scratch"
        );
        let stream = streams.stream(0);
        Self {
            small_staging: DeviceLweCiphertextList::new(stream, params.lwe_dimension, max_blocks),
            big_staging: DeviceLweCiphertextList::new(
                stream,
                params.big_lwe_dimension(),
                max_blocks,
            ),
            max_blocks,
            released: false,
        }
    }

    /// Frees the device staging memory. The buffer must not be used again.
    pub fn release(&mut self, streams: &DeviceStreams) {
        let stream = streams.stream(0);
        self.small_staging = DeviceLweCiphertextList::new(stream, LweDimension(0), 0);
        self.big_staging = DeviceLweCiphertextList::new(stream, LweDimension(0), 0);
        self.released = true;
        tracing::debug!("released lut application scratch");
    }

    pub(crate) fn ensure_usable(&self, num_blocks: usize) {
        if self.released {
            launch_abort!("usage error: lut application scratch used after release");
        }
        if num_blocks > self.max_blocks {
            launch_abort!(
                "usage error: lut application scratch sized for {} blocks, asked to process {}",
                self.max_blocks,
                num_blocks
            );
        }
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Keyswitches `num_blocks` big blocks of `input` into the small list
    /// `output`, partitioning the batch across the device set.
    pub(crate) fn keyswitch_batch_partitioned_async(
        &self,
        streams: &DeviceStreams,
        output: &mut [u64],
        input: &[u64],
        num_blocks: usize,
    ) {
        let params = self.parameters();
        let small_size = params.lwe_dimension.to_lwe_size();
        let big_size = params.big_lwe_dimension().to_lwe_size();
        assert_eq!(output.len(), num_blocks * small_size);
        assert_eq!(input.len(), num_blocks * big_size);

        let ranges = blocks_per_device(num_blocks, streams.len());
        let out_parts = split_blocks_mut(output, small_size, &ranges);
        let mut work: Vec<_> = ranges.iter().zip(out_parts).enumerate().collect();
        work.par_iter_mut().for_each(|(device, (range, out_part))| {
            let in_part = &input[range.start * big_size..range.end * big_size];
            self.backend().keyswitch_batch(
                streams.stream(*device),
                params,
                out_part,
                in_part,
                range.len(),
            );
        });
    }

    /// Bootstraps `num_blocks` small blocks of `input` through `lut` into
    /// the big list `output`, partitioning the batch across the device set.
    pub(crate) fn bootstrap_batch_partitioned_async(
        &self,
        streams: &DeviceStreams,
        output: &mut [u64],
        input: &[u64],
        lut: &DeviceLut,
        num_blocks: usize,
    ) {
        let params = self.parameters();
        let small_size = params.lwe_dimension.to_lwe_size();
        let big_size = params.big_lwe_dimension().to_lwe_size();
        assert_eq!(output.len(), num_blocks * big_size);
        assert_eq!(input.len(), num_blocks * small_size);

        let ranges = blocks_per_device(num_blocks, streams.len());
        let out_parts = split_blocks_mut(output, big_size, &ranges);
        let mut work: Vec<_> = ranges.iter().zip(out_parts).enumerate().collect();
        work.par_iter_mut().for_each(|(device, (range, out_part))| {
            let in_part = &input[range.start * small_size..range.end * small_size];
            self.backend().bootstrap_batch(
                streams.stream(*device),
                params,
                out_part,
                in_part,
                lut.accumulator(),
                range.len(),
            );
        });
    }

    /// Runs the full pipeline on flat block storage: keyswitch `input` into
    /// the staging list, bootstrap the staging list into `output`.
    ///
    /// `output` and `input` may refer to the same blocks (the assign
    /// variants do): every input block is fully consumed by the keyswitch
    /// pass before the bootstrap pass writes any output block, and the
    /// staging list is distinct from both.
    pub(crate) fn keyswitch_bootstrap_batch_async(
        &self,
        streams: &DeviceStreams,
        output: &mut [u64],
        input: &[u64],
        small_staging: &mut DeviceLweCiphertextList,
        lut: &DeviceLut,
        num_blocks: usize,
    ) {
        let small_size = self.parameters().lwe_dimension.to_lwe_size();
        let staging = &mut small_staging.as_flat_mut()[..num_blocks * small_size];
        self.keyswitch_batch_partitioned_async(streams, staging, input, num_blocks);
        self.bootstrap_batch_partitioned_async(streams, output, staging, lut, num_blocks);
    }

    /// Applies a univariate lookup table to every block of `ct`, in place.
    pub fn apply_univariate_lut_assign_async(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        lut: &DeviceLut,
        buffer: &mut LutApplicationBuffer,
    ) {
        let num_blocks = ct.num_blocks();
        buffer.ensure_usable(num_blocks);
        let small_size = self.parameters().lwe_dimension.to_lwe_size();
        let staging = &mut buffer.small_staging.as_flat_mut()[..num_blocks * small_size];
        self.keyswitch_batch_partitioned_async(
            streams,
            staging,
            ct.d_blocks.as_flat(),
            num_blocks,
        );
        self.bootstrap_batch_partitioned_async(
            streams,
            ct.d_blocks.as_flat_mut(),
            staging,
            lut,
            num_blocks,
        );
        ct.info = ct.info.after_lookup_table(lut.degree());
    }

    /// Applies a univariate lookup table to every block of `input`, writing
    /// the refreshed blocks to `output`.
    pub fn apply_univariate_lut_async(
        &self,
        streams: &DeviceStreams,
        output: &mut DeviceRadixCiphertext,
        input: &DeviceRadixCiphertext,
        lut: &DeviceLut,
        buffer: &mut LutApplicationBuffer,
    ) {
        output.assert_same_shape(input);
        let num_blocks = input.num_blocks();
        buffer.ensure_usable(num_blocks);
        self.keyswitch_bootstrap_batch_async(
            streams,
            output.d_blocks.as_flat_mut(),
            input.d_blocks.as_flat(),
            &mut buffer.small_staging,
            lut,
            num_blocks,
        );
        output.info = input.info.after_lookup_table(lut.degree());
    }

    /// Packs each block pair `(lhs_i, rhs_i)` as `lhs_i * shift + rhs_i`
    /// into `packed` — a pure per-coefficient linear combination, parallel
    /// over blocks and coefficients, with no cryptographic cost.
    pub(crate) fn pack_bivariate_operands(
        &self,
        packed: &mut [u64],
        lhs: &[u64],
        rhs: &[u64],
        shift: u64,
    ) {
        let big_size = self.parameters().big_lwe_dimension().to_lwe_size();
        assert_eq!(packed.len(), lhs.len());
        assert_eq!(packed.len(), rhs.len());
        packed
            .par_chunks_exact_mut(big_size)
            .zip(lhs.par_chunks_exact(big_size).zip(rhs.par_chunks_exact(big_size)))
            .for_each(|(out_block, (lhs_block, rhs_block))| {
                for ((out, &left), &right) in
                    out_block.iter_mut().zip(lhs_block).zip(rhs_block)
                {
                    *out = left.wrapping_mul(shift).wrapping_add(right);
                }
            });
    }

    /// Core of the bivariate pipeline on flat storage: pack, keyswitch,
    /// bootstrap. `output` may alias either operand; both operands are fully
    /// read by the packing step before anything is overwritten.
    pub(crate) fn apply_bivariate_lut_on_blocks_async(
        &self,
        streams: &DeviceStreams,
        output: &mut [u64],
        lhs: &[u64],
        rhs: &[u64],
        lut: &DeviceBivariateLut,
        buffer: &mut LutApplicationBuffer,
        num_blocks: usize,
    ) {
        buffer.ensure_usable(num_blocks);
        let big_size = self.parameters().big_lwe_dimension().to_lwe_size();
        let small_size = self.parameters().lwe_dimension.to_lwe_size();
        let packed = &mut buffer.big_staging.as_flat_mut()[..num_blocks * big_size];
        self.pack_bivariate_operands(packed, lhs, rhs, lut.ct_right_modulus.0);
        let staging = &mut buffer.small_staging.as_flat_mut()[..num_blocks * small_size];
        self.keyswitch_batch_partitioned_async(streams, staging, packed, num_blocks);
        self.bootstrap_batch_partitioned_async(streams, output, staging, &lut.lut, num_blocks);
    }

    /// Applies a bivariate lookup table to every block pair of
    /// `(ct_left, ct_right)`, writing the result over `ct_left`.
    ///
    /// The packed value `lhs_i * shift + rhs_i` must fit the plaintext space
    /// the accumulator was built for; the worst case is asserted at LUT
    /// construction, keeping the actual operand degrees in range is the
    /// caller's contract (a violation yields a wrong function result, not a
    /// crash).
    pub fn apply_bivariate_lut_assign_async(
        &self,
        streams: &DeviceStreams,
        ct_left: &mut DeviceRadixCiphertext,
        ct_right: &DeviceRadixCiphertext,
        lut: &DeviceBivariateLut,
        buffer: &mut LutApplicationBuffer,
    ) {
        ct_left.assert_same_shape(ct_right);
        let num_blocks = ct_left.num_blocks();
        debug_assert!(ct_left.info.blocks.iter().zip(ct_right.info.blocks.iter()).all(
            |(left, right)| {
                left.degree.get() * lut.ct_right_modulus.0 + right.degree.get()
                    < self.parameters().total_modulus()
            }
        ));
        buffer.ensure_usable(num_blocks);
        let big_size = self.parameters().big_lwe_dimension().to_lwe_size();
        let small_size = self.parameters().lwe_dimension.to_lwe_size();
        // Packing reads both operands into the staging list before the
        // pipeline writes any block of ct_left, so assigning in place is
        // safe.
        {
            let packed = &mut buffer.big_staging.as_flat_mut()[..num_blocks * big_size];
            self.pack_bivariate_operands(
                packed,
                ct_left.d_blocks.as_flat(),
                ct_right.d_blocks.as_flat(),
                lut.ct_right_modulus.0,
            );
        }
        {
            let packed = &buffer.big_staging.as_flat()[..num_blocks * big_size];
            let staging = &mut buffer.small_staging.as_flat_mut()[..num_blocks * small_size];
            self.keyswitch_batch_partitioned_async(streams, staging, packed, num_blocks);
        }
        self.bootstrap_batch_partitioned_async(
            streams,
            ct_left.d_blocks.as_flat_mut(),
            &buffer.small_staging.as_flat()[..num_blocks * small_size],
            &lut.lut,
            num_blocks,
        );
        ct_left.info = ct_left.info.after_lookup_table(lut.degree());
    }

    /// Applies a univariate lookup table in place over a block range of a
    /// list. `list` must be distinct from the buffer's staging lists.
    pub(crate) fn apply_univariate_inplace_on_range_async(
        &self,
        streams: &DeviceStreams,
        list: &mut DeviceLweCiphertextList,
        range: std::ops::Range<usize>,
        lut: &DeviceLut,
        buffer: &mut LutApplicationBuffer,
    ) {
        let count = range.len();
        buffer.ensure_usable(count);
        let small_size = self.parameters().lwe_dimension.to_lwe_size();
        {
            let staging = &mut buffer.small_staging.as_flat_mut()[..count * small_size];
            self.keyswitch_batch_partitioned_async(streams, staging, list.blocks(range.clone()), count);
        }
        let staging = &buffer.small_staging.as_flat()[..count * small_size];
        self.bootstrap_batch_partitioned_async(streams, list.blocks_mut(range), staging, lut, count);
    }

    /// One-shot convenience wrapper: allocates the scratch, uploads the
    /// table, runs the univariate pipeline in place and tears the scratch
    /// down again. Repeated invocations of one operation should allocate
    /// the scratch once instead.
    pub fn apply_univariate_lut_assign(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        lut: &LookupTableOwned,
    ) {
        let mut buffer = LutApplicationBuffer::new(streams, self.parameters(), ct.num_blocks());
        let d_lut = DeviceLut::from_lookup_table(streams.stream(0), lut.clone());
        self.apply_univariate_lut_assign_async(streams, ct, &d_lut, &mut buffer);
        buffer.release(streams);
        streams.synchronize();
    }
}
