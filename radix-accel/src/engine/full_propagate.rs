//! Sequential per-block carry normalization.
//!
//! Used after operations that can overflow a block by more than one carry
//! (block sums of several operands, products): each block is split into its
//! message and carry digits by two bootstraps and the carry digit is added
//! into the next block before that one is processed in turn. Linear depth,
//! `2n - 1` bootstraps.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::{launch_abort, DeviceStreams};
use crate::engine::LutApplicationBuffer;
use crate::entities::{Degree, DeviceLut, DeviceLweCiphertextList, DeviceRadixCiphertext};

/// Scratch of the serial propagation: the message/carry extraction tables
/// and a one-block staging slot for the extracted carry.
pub struct FullPropagationBuffer {
    apply: LutApplicationBuffer,
    carry_staging: DeviceLweCiphertextList,
    lut_message_extract: DeviceLut,
    lut_carry_extract: DeviceLut,
    released: bool,
}

impl FullPropagationBuffer {
    pub fn release(&mut self, streams: &DeviceStreams) {
        self.apply.release(streams);
        self.released = true;
        tracing::debug!("released full propagation scratch");
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Allocates the scratch for serial full propagation; the same scratch
    /// serves any block count.
    pub fn scratch_full_propagate(&self, streams: &DeviceStreams) -> FullPropagationBuffer {
        let params = self.parameters();
        let msg = params.message_modulus.0;
        tracing::debug!("allocating full propagation scratch");
        let stream = streams.stream(0);
        FullPropagationBuffer {
            apply: LutApplicationBuffer::new(streams, params, 1),
            carry_staging: DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), 1),
            lut_message_extract: DeviceLut::from_lookup_table(
                stream,
                self.generate_lookup_table(move |x| x % msg),
            ),
            lut_carry_extract: DeviceLut::from_lookup_table(
                stream,
                self.generate_lookup_table(move |x| (x / msg) % msg),
            ),
            released: false,
        }
    }

    /// Normalizes every block of `ct` in place, low to high: the carry
    /// digit extracted from block `i` is added into block `i + 1` before
    /// that block is normalized itself, so arbitrarily filled carries chain
    /// correctly. The carry out of the last block is discarded (the value
    /// is reduced modulo `message_modulus ^ num_blocks`).
    pub fn full_propagate_assign_async(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        buffer: &mut FullPropagationBuffer,
    ) {
        if buffer.released {
            launch_abort!("usage error: full propagation scratch used after release");
        }
        let total = self.parameters().total_modulus();
        let message_modulus = self.parameters().message_modulus.0;
        debug_assert!(
            ct.info
                .blocks
                .iter()
                .all(|b| b.degree.get() + (total - 1) / message_modulus < total),
            "a block must be able to absorb its neighbour's carry digit without leaving the \
             plaintext space"
        );
        let n = ct.num_blocks();
        let small_size = self.parameters().lwe_dimension.to_lwe_size();

        for i in 0..n {
            let extract_carry = i + 1 < n;
            // Keyswitch block i once; both extraction bootstraps consume the
            // same keyswitched block.
            {
                let staging = &mut buffer.apply.small_staging.as_flat_mut()[..small_size];
                self.keyswitch_batch_partitioned_async(
                    streams,
                    staging,
                    ct.d_blocks.blocks(i..i + 1),
                    1,
                );
            }
            let staging = &buffer.apply.small_staging.as_flat()[..small_size];
            if extract_carry {
                self.bootstrap_batch_partitioned_async(
                    streams,
                    buffer.carry_staging.blocks_mut(0..1),
                    staging,
                    &buffer.lut_carry_extract,
                    1,
                );
            }
            self.bootstrap_batch_partitioned_async(
                streams,
                ct.d_blocks.blocks_mut(i..i + 1),
                staging,
                &buffer.lut_message_extract,
                1,
            );
            if extract_carry {
                let carry = buffer.carry_staging.block(0);
                let next = ct.d_blocks.block_mut(i + 1);
                for (scalar, &c) in next.iter_mut().zip(carry) {
                    *scalar = scalar.wrapping_add(c);
                }
            }
        }

        let msg_degree = Degree::new(self.parameters().message_modulus.0 - 1);
        for info in ct.info.blocks.iter_mut() {
            info.degree = msg_degree;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::ClearBackend;
    use crate::device::{DeviceIndex, DeviceStreams};
    use crate::engine::RadixEngine;
    use crate::parameters::PARAM_MESSAGE_2_CARRY_2_KS_PBS;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn full_propagation_chains_multi_bit_carries() {
        let engine = RadixEngine::new(ClearBackend::new(), PARAM_MESSAGE_2_CARRY_2_KS_PBS);
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        let params = *engine.parameters();
        let msg = params.message_modulus.0;
        // A block must be able to absorb the largest carry digit of its
        // lower neighbour without leaving the plaintext space.
        let max_carry_digit = (params.total_modulus() - 1) / msg;
        let max_block_value = params.total_modulus() - 1 - max_carry_digit;
        let mut rng = StdRng::seed_from_u64(99);

        let mut buffer = engine.scratch_full_propagate(&streams);
        for num_blocks in [1usize, 2, 5, 8] {
            for _ in 0..10 {
                let raw: Vec<u64> = (0..num_blocks)
                    .map(|_| rng.gen_range(0..=max_block_value))
                    .collect();
                let mut ct = engine.create_trivial_radix_async(&streams, &raw);
                engine.full_propagate_assign_async(&streams, &mut ct, &mut buffer);

                let mut carry = 0;
                let expected: Vec<u64> = raw
                    .iter()
                    .map(|&value| {
                        let total = value + carry;
                        carry = total / msg;
                        total % msg
                    })
                    .collect();
                assert_eq!(
                    engine.decrypt_trivial_radix(&streams, &ct),
                    expected,
                    "raw blocks {raw:?}"
                );
                assert!(ct.block_carries_are_empty());
            }
        }
        buffer.release(&streams);
    }
}
