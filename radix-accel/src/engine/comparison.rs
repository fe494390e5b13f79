//! Multi-block comparison: per-block 2-bit order relations and the
//! logarithmic-depth tree collapsing them into a single relation.

use super::RadixEngine;
use crate::backend::AccelBackend;
use crate::device::{launch_abort, DeviceStreams};
use crate::engine::LutApplicationBuffer;
use crate::entities::radix_ciphertext::block_info_for;
use crate::entities::{
    BivariateLookupTableOwned, DeviceBivariateLut, DeviceLut, DeviceLweCiphertextList,
    DeviceRadixCiphertext, RadixCiphertextInfo,
};
use crate::parameters::MessageModulus;

// Comparison encoding
// -------------------
// x > y -> 2 = 10
// x = y -> 1 = 01
// x < y -> 0 = 00
pub const IS_INFERIOR: u64 = 0;
pub const IS_EQUAL: u64 = 1;
pub const IS_SUPERIOR: u64 = 2;

/// The canonical rule combining the orderings of two adjacent positions:
/// the more significant one wins unless it is an equality, in which case
/// the less significant one decides.
pub fn sign_reduction_rule(msb_order: u64, lsb_order: u64) -> u64 {
    if msb_order == IS_EQUAL {
        lsb_order
    } else {
        msb_order
    }
}

/// Orders occupy two bits, so tree rounds pack pairs with this shift.
const ORDER_PACKING_FACTOR: u64 = 4;

/// Scratch of the sign reduction tree for one block count: the resident
/// selector tables and two alternating work lists of half length.
///
/// The combining `block_selector` and the final transform are fixed at
/// scratch time; their tables live on the device for the buffer's whole
/// life.
pub struct SignReductionBuffer {
    apply: LutApplicationBuffer,
    work_a: DeviceLweCiphertextList,
    work_b: DeviceLweCiphertextList,
    /// Selector over a packed pair, used while more than 2 blocks remain.
    lut_selector: Option<DeviceBivariateLut>,
    /// Selector composed with the final transform, for the last pair.
    lut_final_pair: Option<DeviceBivariateLut>,
    /// Final transform alone, for the single-block case.
    lut_final_single: DeviceLut,
    num_blocks: usize,
    released: bool,
}

impl SignReductionBuffer {
    pub fn release(&mut self, streams: &DeviceStreams) {
        self.apply.release(streams);
        self.released = true;
        tracing::debug!(num_blocks = self.num_blocks, "released sign reduction scratch");
    }

    fn ensure_usable(&self, num_blocks: usize) {
        if self.released {
            launch_abort!("usage error: sign reduction scratch used after release");
        }
        if self.num_blocks != num_blocks {
            launch_abort!(
                "usage error: sign reduction scratch sized for {} blocks, invoked with {}",
                self.num_blocks,
                num_blocks
            );
        }
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Allocates the sign reduction scratch for `num_blocks` per-block
    /// orderings, combined by `block_selector` and finally mapped through
    /// `final_transform` (e.g. an order-code to offset mapping, or the
    /// identity).
    pub fn scratch_reduce_signs<S, F>(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
        block_selector: S,
        final_transform: F,
    ) -> SignReductionBuffer
    where
        S: Fn(u64, u64) -> u64,
        F: Fn(u64) -> u64,
    {
        let params = self.parameters();
        assert!(
            params.total_modulus() >= 16,
            "sign reduction packs two 2-bit orderings into one bootstrap input and needs at \
             least 4 bits per block, parameters offer {}",
            params.total_modulus()
        );
        assert!(num_blocks > 0, "cannot reduce zero sign blocks");

        // Orderings are 2-bit values whatever the message modulus, so the
        // pair tables are built over the raw packing rather than through the
        // message-modulus bivariate wrapper.
        let pair_table = |f: &dyn Fn(u64) -> u64| BivariateLookupTableOwned {
            acc: self.generate_lookup_table(|packed| {
                f(block_selector(
                    packed / ORDER_PACKING_FACTOR,
                    packed % ORDER_PACKING_FACTOR,
                ))
            }),
            ct_right_modulus: MessageModulus(ORDER_PACKING_FACTOR),
        };

        tracing::debug!(num_blocks, "allocating sign reduction scratch");
        let stream = streams.stream(0);
        let half = num_blocks.div_ceil(2);
        let lut_selector = (num_blocks > 2)
            .then(|| DeviceBivariateLut::from_lookup_table(stream, pair_table(&|order| order)));
        let lut_final_pair = (num_blocks >= 2)
            .then(|| DeviceBivariateLut::from_lookup_table(stream, pair_table(&final_transform)));
        SignReductionBuffer {
            apply: LutApplicationBuffer::new(streams, params, half),
            work_a: DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), half),
            work_b: DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), half),
            lut_selector,
            lut_final_pair,
            lut_final_single: DeviceLut::from_lookup_table(
                stream,
                self.generate_lookup_table(&final_transform),
            ),
            num_blocks,
            released: false,
        }
    }

    /// Collapses one 2-bit ordering per block into a single ordering for
    /// the whole integer: while more than 2 blocks remain, adjacent pairs
    /// are packed and reduced by one bootstrap each, halving the count per
    /// round (an odd trailing block is carried into the next round
    /// unchanged); the last round also applies the buffer's final
    /// transform. Returns the single result block.
    ///
    /// The result does not depend on whether the input went through the
    /// pairwise collapse rounds or straight to the final two-block (or
    /// one-block) table.
    pub fn reduce_signs_async(
        &self,
        streams: &DeviceStreams,
        sign_blocks: &DeviceLweCiphertextList,
        buffer: &mut SignReductionBuffer,
    ) -> DeviceRadixCiphertext {
        let params = self.parameters();
        let n = sign_blocks.lwe_ciphertext_count();
        buffer.ensure_usable(n);
        let stream = streams.stream(0);
        let size = sign_blocks.lwe_size();

        let mut result = DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), 1);

        let result_degree = if n == 1 {
            // Nothing to combine, only the final transform applies.
            self.keyswitch_bootstrap_batch_async(
                streams,
                result.blocks_mut(0..1),
                sign_blocks.blocks(0..1),
                &mut buffer.apply.small_staging,
                &buffer.lut_final_single,
                1,
            );
            buffer.lut_final_single.degree()
        } else {
            let mut remaining = n;
            // `in_b` tracks which work list holds the surviving orderings.
            let mut in_b = false;

            if remaining > 2 {
                // First collapse round reads the caller's list.
                let pairs = remaining / 2;
                {
                    let packed_count = pairs + remaining % 2;
                    self.pack_block_pairs_on_slices(
                        &mut buffer.work_a.as_flat_mut()[..packed_count * size],
                        &sign_blocks.as_flat()[..remaining * size],
                        remaining,
                        ORDER_PACKING_FACTOR,
                    );
                }
                let selector = &buffer.lut_selector.as_ref().unwrap().lut;
                self.apply_univariate_inplace_on_range_async(
                    streams,
                    &mut buffer.work_a,
                    0..pairs,
                    selector,
                    &mut buffer.apply,
                );
                remaining = pairs + remaining % 2;

                while remaining > 2 {
                    let pairs = remaining / 2;
                    {
                        let (src, dst) = if in_b {
                            (&buffer.work_b, &mut buffer.work_a)
                        } else {
                            (&buffer.work_a, &mut buffer.work_b)
                        };
                        let packed_count = pairs + remaining % 2;
                        self.pack_block_pairs_on_slices(
                            &mut dst.as_flat_mut()[..packed_count * size],
                            &src.as_flat()[..remaining * size],
                            remaining,
                            ORDER_PACKING_FACTOR,
                        );
                    }
                    let dst = if in_b {
                        &mut buffer.work_a
                    } else {
                        &mut buffer.work_b
                    };
                    let selector = &buffer.lut_selector.as_ref().unwrap().lut;
                    self.apply_univariate_inplace_on_range_async(
                        streams,
                        dst,
                        0..pairs,
                        selector,
                        &mut buffer.apply,
                    );
                    in_b = !in_b;
                    remaining = pairs + remaining % 2;
                }
            }

            // Exactly two orderings left: one packed bootstrap applies the
            // selector composed with the final transform.
            debug_assert_eq!(remaining, 2);
            let final_src: &DeviceLweCiphertextList = if n == 2 {
                sign_blocks
            } else if in_b {
                &buffer.work_b
            } else {
                &buffer.work_a
            };
            self.pack_block_pairs_on_slices(
                &mut result.as_flat_mut()[..size],
                &final_src.as_flat()[..2 * size],
                2,
                ORDER_PACKING_FACTOR,
            );
            let lut_final = buffer.lut_final_pair.as_ref().unwrap();
            self.apply_univariate_inplace_on_range_async(
                streams,
                &mut result,
                0..1,
                &lut_final.lut,
                &mut buffer.apply,
            );
            lut_final.degree()
        };

        DeviceRadixCiphertext {
            d_blocks: result,
            info: RadixCiphertextInfo {
                blocks: vec![block_info_for(params, result_degree)],
            },
        }
    }
}

/// Scratch of the full comparison operation: the per-block order table and
/// the sign reduction tree fed by it.
pub struct ComparisonBuffer {
    apply: LutApplicationBuffer,
    orders: DeviceLweCiphertextList,
    lut_compare: DeviceBivariateLut,
    sign_reduce: SignReductionBuffer,
    num_blocks: usize,
    released: bool,
}

impl ComparisonBuffer {
    pub fn release(&mut self, streams: &DeviceStreams) {
        self.apply.release(streams);
        self.sign_reduce.release(streams);
        self.released = true;
        tracing::debug!(num_blocks = self.num_blocks, "released comparison scratch");
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Allocates the comparison scratch. `sign_result_handler` maps the
    /// final order code (`IS_INFERIOR` / `IS_EQUAL` / `IS_SUPERIOR`) to the
    /// caller's encoding, e.g. a boolean for `lt` or `eq`.
    pub fn scratch_compare<F>(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
        sign_result_handler: F,
    ) -> ComparisonBuffer
    where
        F: Fn(u64) -> u64,
    {
        let params = self.parameters();
        assert!(
            params.carry_modulus.0 >= params.message_modulus.0,
            "per-block comparison packs both operand digits into one bootstrap input and needs \
             carry space at least as large as the message space"
        );
        let lut_compare = self.generate_lookup_table_bivariate(|lhs, rhs| {
            if lhs > rhs {
                IS_SUPERIOR
            } else if lhs == rhs {
                IS_EQUAL
            } else {
                IS_INFERIOR
            }
        });
        let stream = streams.stream(0);
        ComparisonBuffer {
            apply: LutApplicationBuffer::new(streams, params, num_blocks),
            orders: DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), num_blocks),
            lut_compare: DeviceBivariateLut::from_lookup_table(stream, lut_compare),
            sign_reduce: self.scratch_reduce_signs(
                streams,
                num_blocks,
                sign_reduction_rule,
                sign_result_handler,
            ),
            num_blocks,
            released: false,
        }
    }

    /// Compares two radix ciphertexts block-wise and reduces the per-block
    /// orderings to a single block holding the handler-mapped order of the
    /// whole integers. Expects clean carries on both operands.
    pub fn unchecked_compare_async(
        &self,
        streams: &DeviceStreams,
        lhs: &DeviceRadixCiphertext,
        rhs: &DeviceRadixCiphertext,
        buffer: &mut ComparisonBuffer,
    ) -> DeviceRadixCiphertext {
        lhs.assert_same_shape(rhs);
        let n = lhs.num_blocks();
        if buffer.released {
            launch_abort!("usage error: comparison scratch used after release");
        }
        if buffer.num_blocks != n {
            launch_abort!(
                "usage error: comparison scratch sized for {} blocks, invoked with {}",
                buffer.num_blocks,
                n
            );
        }
        debug_assert!(lhs.block_carries_are_empty() && rhs.block_carries_are_empty());

        self.apply_bivariate_lut_on_blocks_async(
            streams,
            buffer.orders.blocks_mut(0..n),
            lhs.d_blocks.as_flat(),
            rhs.d_blocks.as_flat(),
            &buffer.lut_compare,
            &mut buffer.apply,
            n,
        );
        self.reduce_signs_async(streams, &buffer.orders, &mut buffer.sign_reduce)
    }
}

#[cfg(test)]
mod tests {
    use super::{sign_reduction_rule, IS_EQUAL, IS_INFERIOR, IS_SUPERIOR};
    use crate::backend::ClearBackend;
    use crate::device::{DeviceIndex, DeviceStreams};
    use crate::engine::RadixEngine;
    use crate::parameters::PARAM_MESSAGE_2_CARRY_2_KS_PBS;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cmp::Ordering;

    fn engine() -> RadixEngine<ClearBackend> {
        RadixEngine::new(ClearBackend::new(), PARAM_MESSAGE_2_CARRY_2_KS_PBS)
    }

    /// Plaintext reference: the most significant non-equal ordering wins.
    fn reference_reduce(orders: &[u64]) -> u64 {
        orders
            .iter()
            .rev()
            .copied()
            .find(|&order| order != IS_EQUAL)
            .unwrap_or(IS_EQUAL)
    }

    #[test]
    fn sign_tree_matches_reference_for_every_block_count() {
        let engine = engine();
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        let mut rng = StdRng::seed_from_u64(42);

        for num_blocks in 1..=33usize {
            let mut buffer = engine.scratch_reduce_signs(
                &streams,
                num_blocks,
                sign_reduction_rule,
                |order| order,
            );
            for _ in 0..5 {
                let orders: Vec<u64> =
                    (0..num_blocks).map(|_| rng.gen_range(0..=2)).collect();
                let signs = engine.create_trivial_radix_async(&streams, &orders);
                let reduced = engine.reduce_signs_async(&streams, &signs.d_blocks, &mut buffer);
                assert_eq!(
                    engine.decrypt_trivial_radix(&streams, &reduced),
                    vec![reference_reduce(&orders)],
                    "orders {orders:?}"
                );
            }
            buffer.release(&streams);
        }
    }

    #[test]
    fn final_transform_applies_on_every_path() {
        // The transform must reach the result whether the input went
        // through collapse rounds (n > 2), the direct pair table (n == 2)
        // or the single-block table (n == 1).
        let engine = engine();
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        let transform = |order: u64| 4 + order;

        for num_blocks in [1usize, 2, 3, 7] {
            let mut buffer =
                engine.scratch_reduce_signs(&streams, num_blocks, sign_reduction_rule, transform);
            let orders: Vec<u64> = (0..num_blocks as u64).map(|i| i % 3).collect();
            let signs = engine.create_trivial_radix_async(&streams, &orders);
            let reduced = engine.reduce_signs_async(&streams, &signs.d_blocks, &mut buffer);
            assert_eq!(
                engine.decrypt_trivial_radix(&streams, &reduced),
                vec![transform(reference_reduce(&orders))]
            );
            buffer.release(&streams);
        }
    }

    #[test]
    fn comparison_orders_whole_integers() {
        let engine = engine();
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        let msg = engine.parameters().message_modulus.0;
        let mut rng = StdRng::seed_from_u64(7);

        for num_blocks in [1usize, 2, 4, 9] {
            let mut buffer = engine.scratch_compare(&streams, num_blocks, |order| order);
            let modulus = msg.pow(num_blocks as u32);
            for _ in 0..10 {
                let a = rng.gen_range(0..modulus);
                let b = rng.gen_range(0..modulus);
                let lhs = engine.create_trivial_radix_from_integer_async(&streams, a, num_blocks);
                let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, num_blocks);
                let result = engine.unchecked_compare_async(&streams, &lhs, &rhs, &mut buffer);
                let expected = match a.cmp(&b) {
                    Ordering::Less => IS_INFERIOR,
                    Ordering::Equal => IS_EQUAL,
                    Ordering::Greater => IS_SUPERIOR,
                };
                assert_eq!(
                    engine.decrypt_trivial_radix(&streams, &result),
                    vec![expected],
                    "comparing {a} and {b} over {num_blocks} blocks"
                );
            }
            buffer.release(&streams);
        }
    }

    #[test]
    fn comparison_handler_maps_the_order() {
        let engine = engine();
        let streams = DeviceStreams::new_single(DeviceIndex(0));
        // An `is greater or equal` handler.
        let mut buffer = engine.scratch_compare(&streams, 4, |order| {
            u64::from(order != IS_INFERIOR)
        });
        for (a, b) in [(5u64, 9u64), (9, 5), (7, 7)] {
            let lhs = engine.create_trivial_radix_from_integer_async(&streams, a, 4);
            let rhs = engine.create_trivial_radix_from_integer_async(&streams, b, 4);
            let result = engine.unchecked_compare_async(&streams, &lhs, &rhs, &mut buffer);
            assert_eq!(
                engine.decrypt_trivial_radix(&streams, &result),
                vec![u64::from(a >= b)]
            );
        }
        buffer.release(&streams);
    }
}
