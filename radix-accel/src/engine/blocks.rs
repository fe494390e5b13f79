//! Block-level primitives: rotation of a block sequence, pairwise packing,
//! trivial encoding.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::DeviceStreams;
use crate::entities::lookup_table::{read_trivial_block, write_trivial_block};
use crate::entities::radix_ciphertext::block_info_for;
use crate::entities::{
    Degree, DeviceLweCiphertextList, DeviceRadixCiphertext, RadixCiphertextInfo,
};
use rayon::prelude::*;

impl<B: AccelBackend> RadixEngine<B> {
    /// Cyclic rotation of the block sequence: block `i` of `src` lands at
    /// block `(i + amount) % count` of `dst`.
    ///
    /// `dst` and `src` must be distinct lists (enforced by the signature);
    /// the operation is not defined over overlapping storage.
    pub fn rotate_blocks_right_async(
        &self,
        streams: &DeviceStreams,
        dst: &mut DeviceLweCiphertextList,
        src: &DeviceLweCiphertextList,
        amount: usize,
    ) {
        let count = src.lwe_ciphertext_count();
        assert!(count > 0, "block rotation: empty block sequence");
        assert_eq!(
            dst.lwe_ciphertext_count(),
            count,
            "block rotation: source has {} blocks, destination {}",
            count,
            dst.lwe_ciphertext_count()
        );
        let stream = streams.stream(0);
        let amount = amount % count;
        dst.copy_blocks_async(amount, src, 0..count - amount, stream);
        if amount != 0 {
            dst.copy_blocks_async(0, src, count - amount..count, stream);
        }
    }

    /// Inverse of [`Self::rotate_blocks_right_async`].
    pub fn rotate_blocks_left_async(
        &self,
        streams: &DeviceStreams,
        dst: &mut DeviceLweCiphertextList,
        src: &DeviceLweCiphertextList,
        amount: usize,
    ) {
        let count = src.lwe_ciphertext_count();
        assert!(count > 0, "block rotation: empty block sequence");
        let amount = amount % count;
        self.rotate_blocks_right_async(streams, dst, src, (count - amount) % count);
    }

    /// Combines adjacent block pairs into `out_k = in_{2k} + factor *
    /// in_{2k+1}`; when the block count is odd the trailing block is copied
    /// unchanged. Halves the number of blocks later rounds must bootstrap.
    pub fn pack_blocks_async(
        &self,
        streams: &DeviceStreams,
        out: &mut DeviceLweCiphertextList,
        input: &DeviceLweCiphertextList,
        factor: u64,
    ) {
        assert_eq!(
            input.lwe_dimension(),
            self.parameters().big_lwe_dimension(),
            "block packing operates on big radix blocks"
        );
        assert_eq!(
            streams.stream(0).device_index(),
            out.device_index(),
            "device error: first stream is on device {}, output list on device {}",
            streams.stream(0).device_index().get(),
            out.device_index().get()
        );
        let count = input.lwe_ciphertext_count();
        let packed_count = count.div_ceil(2);
        assert!(
            out.lwe_ciphertext_count() >= packed_count,
            "block packing: {count} input blocks need {packed_count} output slots, got {}",
            out.lwe_ciphertext_count()
        );
        let size = input.lwe_size();
        self.pack_block_pairs_on_slices(
            &mut out.as_flat_mut()[..packed_count * size],
            &input.as_flat()[..count * size],
            count,
            factor,
        );
    }

    /// Flat-storage core of [`Self::pack_blocks_async`].
    pub(crate) fn pack_block_pairs_on_slices(
        &self,
        out: &mut [u64],
        input: &[u64],
        count: usize,
        factor: u64,
    ) {
        let size = self.parameters().big_lwe_dimension().to_lwe_size();
        let pairs = count / 2;
        assert_eq!(input.len(), count * size);
        assert_eq!(out.len(), count.div_ceil(2) * size);

        out[..pairs * size]
            .par_chunks_exact_mut(size)
            .zip(input[..pairs * 2 * size].par_chunks_exact(2 * size))
            .for_each(|(out_block, in_pair)| {
                let (low, high) = in_pair.split_at(size);
                for ((out, &lsb), &msb) in out_block.iter_mut().zip(low).zip(high) {
                    *out = lsb.wrapping_add(msb.wrapping_mul(factor));
                }
            });

        if count % 2 == 1 {
            out[pairs * size..].copy_from_slice(&input[(count - 1) * size..]);
        }
    }

    /// Encodes plaintext digits directly as ciphertext bodies (zero mask,
    /// body `digit * delta`) with no bootstrap — a trivial ciphertext for
    /// public constants mixed into homomorphic computation.
    pub fn create_trivial_radix_async(
        &self,
        streams: &DeviceStreams,
        digits: &[u64],
    ) -> DeviceRadixCiphertext {
        let params = self.parameters();
        let mut d_blocks = DeviceLweCiphertextList::new(
            streams.stream(0),
            params.big_lwe_dimension(),
            digits.len(),
        );
        let size = d_blocks.lwe_size();
        d_blocks
            .as_flat_mut()
            .par_chunks_exact_mut(size)
            .zip(digits.par_iter())
            .for_each(|(block, &digit)| write_trivial_block(block, digit, params));

        let info = RadixCiphertextInfo {
            blocks: digits
                .iter()
                .map(|&digit| block_info_for(params, Degree::new(digit)))
                .collect(),
        };
        DeviceRadixCiphertext { d_blocks, info }
    }

    /// Trivially encodes an integer, decomposed into `num_blocks` base
    /// `message_modulus` digits, least significant first.
    pub fn create_trivial_radix_from_integer_async(
        &self,
        streams: &DeviceStreams,
        value: u64,
        num_blocks: usize,
    ) -> DeviceRadixCiphertext {
        let message_modulus = self.parameters().message_modulus.0;
        let bits = message_modulus.ilog2();
        let digits: Vec<u64> = (0..num_blocks)
            .map(|i| {
                value
                    .checked_shr(i as u32 * bits)
                    .map_or(0, |shifted| shifted & (message_modulus - 1))
            })
            .collect();
        self.create_trivial_radix_async(streams, &digits)
    }

    /// Reads back the digits of a ciphertext whose blocks are trivial.
    /// Debug and test surface; synchronizes the stream set.
    pub fn decrypt_trivial_radix(
        &self,
        streams: &DeviceStreams,
        ct: &DeviceRadixCiphertext,
    ) -> Vec<u64> {
        streams.synchronize();
        let params = self.parameters();
        (0..ct.num_blocks())
            .map(|i| read_trivial_block(ct.d_blocks.block(i), params))
            .collect()
    }

    /// Recombines trivially decoded digits into the integer they encode.
    /// The digits must already be normalized (each below the message
    /// modulus).
    pub fn trivial_radix_to_integer(&self, digits: &[u64]) -> u64 {
        let bits = self.parameters().message_modulus.0.ilog2();
        digits
            .iter()
            .rev()
            .fold(0u64, |acc, &digit| (acc << bits) | digit)
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::ClearBackend;
    use crate::device::DeviceStreams;
    use crate::engine::RadixEngine;
    use crate::entities::DeviceLweCiphertextList;
    use crate::parameters::PARAM_MESSAGE_2_CARRY_2_KS_PBS;

    fn engine() -> RadixEngine<ClearBackend> {
        RadixEngine::new(ClearBackend::new(), PARAM_MESSAGE_2_CARRY_2_KS_PBS)
    }

    #[test]
    fn trivial_radix_round_trips() {
        let engine = engine();
        let streams = DeviceStreams::new_single(crate::device::DeviceIndex(0));
        let ct = engine.create_trivial_radix_from_integer_async(&streams, 0b10_01_11_00, 4);
        let digits = engine.decrypt_trivial_radix(&streams, &ct);
        assert_eq!(digits, vec![0, 3, 1, 2]);
        assert_eq!(engine.trivial_radix_to_integer(&digits), 0b10_01_11_00);
    }

    #[test]
    fn rotations_are_inverses() {
        let engine = engine();
        let streams = DeviceStreams::new_single(crate::device::DeviceIndex(0));
        let params = engine.parameters();
        for num_blocks in 1..=32usize {
            let digits: Vec<u64> = (0..num_blocks as u64)
                .map(|i| i % params.message_modulus.0)
                .collect();
            let ct = engine.create_trivial_radix_async(&streams, &digits);
            for amount in 0..=num_blocks + 1 {
                let mut rotated = DeviceLweCiphertextList::new(
                    streams.stream(0),
                    params.big_lwe_dimension(),
                    num_blocks,
                );
                let mut back = DeviceLweCiphertextList::new(
                    streams.stream(0),
                    params.big_lwe_dimension(),
                    num_blocks,
                );
                engine.rotate_blocks_left_async(&streams, &mut rotated, &ct.d_blocks, amount);
                engine.rotate_blocks_right_async(&streams, &mut back, &rotated, amount);
                streams.synchronize();
                assert_eq!(back.as_flat(), ct.d_blocks.as_flat(), "num_blocks {num_blocks}, amount {amount}");
            }
        }
    }

    #[test]
    fn rotate_right_moves_blocks_up() {
        let engine = engine();
        let streams = DeviceStreams::new_single(crate::device::DeviceIndex(0));
        let ct = engine.create_trivial_radix_async(&streams, &[1, 2, 3, 0]);
        let mut rotated = DeviceLweCiphertextList::new(
            streams.stream(0),
            engine.parameters().big_lwe_dimension(),
            4,
        );
        engine.rotate_blocks_right_async(&streams, &mut rotated, &ct.d_blocks, 1);
        let rotated_ct = crate::entities::DeviceRadixCiphertext {
            d_blocks: rotated,
            info: ct.info.clone(),
        };
        assert_eq!(
            engine.decrypt_trivial_radix(&streams, &rotated_ct),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn packing_combines_adjacent_pairs() {
        let engine = engine();
        let streams = DeviceStreams::new_single(crate::device::DeviceIndex(0));
        let params = engine.parameters();
        // 5 blocks: two pairs and an odd passthrough block
        let ct = engine.create_trivial_radix_async(&streams, &[1, 2, 3, 0, 2]);
        let mut packed = DeviceLweCiphertextList::new(
            streams.stream(0),
            params.big_lwe_dimension(),
            3,
        );
        engine.pack_blocks_async(&streams, &mut packed, &ct.d_blocks, params.message_modulus.0);
        streams.synchronize();
        let decoded: Vec<u64> = (0..3)
            .map(|i| {
                crate::entities::lookup_table::read_trivial_block(packed.block(i), params)
            })
            .collect();
        // out_k = in_2k + factor * in_{2k+1}
        assert_eq!(decoded, vec![1 + 4 * 2, 3 + 4 * 0, 2]);
    }
}
