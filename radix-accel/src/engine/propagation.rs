//! Parallel carry and borrow propagation.
//!
//! Turns a radix ciphertext holding raw block-wise sums (or differences)
//! into the correctly chained result without revealing which blocks carried:
//! every block is classified into a generate/propagate state, the states are
//! resolved by a Hillis-Steele inclusive prefix scan (`ceil(log2(n))`
//! bootstrap rounds, `O(n log n)` bootstraps — more work than the serial
//! walk, but a logarithmic instead of linear dependency chain), and the
//! resolved carries are rotated one block up and folded back in.

use super::{ceil_ilog2, RadixEngine};
use crate::backend::AccelBackend;
use crate::device::{launch_abort, DeviceStreams};
use crate::engine::LutApplicationBuffer;
use crate::entities::radix_ciphertext::block_info_for;
use crate::entities::{
    BivariateLookupTableOwned, Degree, DeviceBivariateLut, DeviceBooleanBlock, DeviceLut,
    DeviceLweCiphertextList, DeviceRadixCiphertext, RadixCiphertextInfo,
};
use crate::parameters::MessageModulus;
use rayon::prelude::*;

/// State of one block after classification of its raw sum or difference.
#[repr(u64)]
#[derive(PartialEq, Eq)]
enum OutputFlag {
    /// The block neither generates nor propagates a carry (borrow).
    None = 0,
    /// The block generates a carry (borrow) on its own.
    Generated = 1,
    /// The block propagates an incoming carry (borrow) if it receives one.
    Propagated = 2,
}

/// Combining rule of the prefix scan: a propagating block inherits the
/// state of its less significant neighbour, any other block keeps its own.
fn prefix_sum_combine(msb: u64, lsb: u64) -> u64 {
    if msb == OutputFlag::Propagated as u64 {
        lsb
    } else {
        msb
    }
}

/// States occupy two bits, so the prefix scan packs pairs with this shift
/// regardless of the message modulus.
const STATE_PACKING_FACTOR: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropagationKind {
    Carry,
    Borrow,
}

/// Scratch of the propagation engine for one operation shape: the
/// classification and combine lookup tables resident on the device, the two
/// alternating scan lists, and the rotation target for resolved carries.
pub struct PropagationBuffer {
    apply: LutApplicationBuffer,
    scan_a: DeviceLweCiphertextList,
    scan_b: DeviceLweCiphertextList,
    resolved: DeviceLweCiphertextList,
    lut_first_block: DeviceLut,
    lut_inner_blocks: DeviceLut,
    lut_prefix: DeviceBivariateLut,
    lut_message_extract: DeviceLut,
    kind: PropagationKind,
    num_blocks: usize,
    released: bool,
}

impl PropagationBuffer {
    /// Frees the device memory held by this scratch. Must be called after
    /// last use; the buffer cannot be used again.
    pub fn release(&mut self, streams: &DeviceStreams) {
        self.apply.release(streams);
        self.released = true;
        tracing::debug!(num_blocks = self.num_blocks, "released propagation scratch");
    }

    fn ensure_usable(&self, kind: PropagationKind, num_blocks: usize) {
        if self.released {
            launch_abort!("usage error: propagation scratch used after release");
        }
        if self.kind != kind {
            launch_abort!(
                "usage error: propagation scratch was created for {:?} propagation, used for {:?}",
                self.kind,
                kind
            );
        }
        if self.num_blocks != num_blocks {
            launch_abort!(
                "usage error: propagation scratch sized for {} blocks, invoked with {}",
                self.num_blocks,
                num_blocks
            );
        }
    }
}

impl<B: AccelBackend> RadixEngine<B> {
    /// Allocates the scratch for single-carry propagation over `num_blocks`
    /// blocks.
    pub fn scratch_propagate_single_carry(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
    ) -> PropagationBuffer {
        self.scratch_propagation(streams, num_blocks, PropagationKind::Carry)
    }

    /// Allocates the scratch for single-borrow propagation over
    /// `num_blocks` blocks.
    pub fn scratch_propagate_single_borrow(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
    ) -> PropagationBuffer {
        self.scratch_propagation(streams, num_blocks, PropagationKind::Borrow)
    }

    fn scratch_propagation(
        &self,
        streams: &DeviceStreams,
        num_blocks: usize,
        kind: PropagationKind,
    ) -> PropagationBuffer {
        let params = self.parameters();
        assert!(
            params.total_modulus() >= 16,
            "parallel propagation packs two 2-bit states into one bootstrap input and needs at \
             least 4 bits per block, parameters offer {}",
            params.total_modulus()
        );
        assert!(num_blocks > 0, "cannot propagate over zero blocks");
        let msg = params.message_modulus.0;

        let (first, inner): (Box<dyn Fn(u64) -> u64>, Box<dyn Fn(u64) -> u64>) = match kind {
            // Raw sum x of two clean blocks: x >= msg definitely carries,
            // x == msg - 1 carries exactly when the block receives one.
            PropagationKind::Carry => (
                Box::new(move |x| {
                    if x >= msg {
                        OutputFlag::Generated as u64
                    } else {
                        OutputFlag::None as u64
                    }
                }),
                Box::new(move |x| {
                    if x >= msg {
                        OutputFlag::Generated as u64
                    } else if x == msg - 1 {
                        OutputFlag::Propagated as u64
                    } else {
                        OutputFlag::None as u64
                    }
                }),
            ),
            // Raw difference x = msg + lhs - rhs: x < msg means lhs < rhs
            // and a borrow is taken, x == msg means equality and an incoming
            // borrow passes through.
            PropagationKind::Borrow => (
                Box::new(move |x| {
                    if x < msg {
                        OutputFlag::Generated as u64
                    } else {
                        OutputFlag::None as u64
                    }
                }),
                Box::new(move |x| {
                    if x < msg {
                        OutputFlag::Generated as u64
                    } else if x == msg {
                        OutputFlag::Propagated as u64
                    } else {
                        OutputFlag::None as u64
                    }
                }),
            ),
        };

        // The generic bivariate wrapper reduces operands modulo the message
        // modulus, which would truncate 2-bit states under small message
        // moduli; the combine table is built over the raw 2-bit packing
        // instead.
        let prefix = BivariateLookupTableOwned {
            acc: self.generate_lookup_table(|x| {
                prefix_sum_combine(x / STATE_PACKING_FACTOR, x % STATE_PACKING_FACTOR)
            }),
            ct_right_modulus: MessageModulus(STATE_PACKING_FACTOR),
        };

        tracing::debug!(num_blocks, ?kind, "allocating propagation scratch");
        let stream = streams.stream(0);
        let big_dimension = params.big_lwe_dimension();
        PropagationBuffer {
            apply: LutApplicationBuffer::new(streams, params, num_blocks),
            scan_a: DeviceLweCiphertextList::new(stream, big_dimension, num_blocks),
            scan_b: DeviceLweCiphertextList::new(stream, big_dimension, num_blocks),
            resolved: DeviceLweCiphertextList::new(stream, big_dimension, num_blocks),
            lut_first_block: DeviceLut::from_lookup_table(stream, self.generate_lookup_table(first)),
            lut_inner_blocks: DeviceLut::from_lookup_table(stream, self.generate_lookup_table(inner)),
            lut_prefix: DeviceBivariateLut::from_lookup_table(stream, prefix),
            lut_message_extract: DeviceLut::from_lookup_table(
                stream,
                self.generate_lookup_table(move |x| x % msg),
            ),
            kind,
            num_blocks,
            released: false,
        }
    }

    /// Propagates the carries of a raw block-wise sum in place and returns
    /// the carry out of the most significant block as an encrypted flag.
    ///
    /// Every block may consume at most one bit of carry (the raw sum of two
    /// clean blocks); afterwards all block carries are empty.
    pub fn propagate_single_carry_assign_async(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) -> DeviceBooleanBlock {
        self.propagate_single_flag_assign_async(streams, ct, buffer, PropagationKind::Carry)
    }

    /// Borrow-propagation mirror of
    /// [`Self::propagate_single_carry_assign_async`]: normalizes a raw
    /// block-wise difference (each block holding
    /// `message_modulus + lhs_i - rhs_i`) and returns the borrow out of the
    /// most significant block — the encrypted overflow flag of the
    /// subtraction.
    pub fn propagate_single_borrow_assign_async(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
    ) -> DeviceBooleanBlock {
        self.propagate_single_flag_assign_async(streams, ct, buffer, PropagationKind::Borrow)
    }

    fn propagate_single_flag_assign_async(
        &self,
        streams: &DeviceStreams,
        ct: &mut DeviceRadixCiphertext,
        buffer: &mut PropagationBuffer,
        kind: PropagationKind,
    ) -> DeviceBooleanBlock {
        let n = ct.num_blocks();
        buffer.ensure_usable(kind, n);
        debug_assert!(
            ct.info
                .blocks
                .iter()
                .all(|b| b.degree.get() < 2 * b.message_modulus.0),
            "propagation input may consume at most one bit of carry per block"
        );
        let params = self.parameters();
        let stream = streams.stream(0);

        // 1. Classify every block. Block 0 has no incoming carry and can
        // only generate, the other blocks may also propagate.
        buffer.apply.ensure_usable(n);
        {
            let staging = &mut buffer.apply.small_staging;
            if n > 1 {
                self.keyswitch_bootstrap_batch_async(
                    streams,
                    buffer.scan_a.blocks_mut(1..n),
                    ct.d_blocks.blocks(1..n),
                    staging,
                    &buffer.lut_inner_blocks,
                    n - 1,
                );
            }
            self.keyswitch_bootstrap_batch_async(
                streams,
                buffer.scan_a.blocks_mut(0..1),
                ct.d_blocks.blocks(0..1),
                staging,
                &buffer.lut_first_block,
                1,
            );
        }

        // 2. Hillis-Steele inclusive prefix scan over the states, double
        // buffered: each round reads the previous round's list and writes
        // the other one, never both in the same list.
        let num_steps = ceil_ilog2(n) as usize;
        let mut cur = &mut buffer.scan_a;
        let mut next = &mut buffer.scan_b;
        let mut space = 1;
        for _ in 0..num_steps {
            next.copy_blocks_async(0, cur, 0..space, stream);
            self.apply_bivariate_lut_on_blocks_async(
                streams,
                next.blocks_mut(space..n),
                cur.blocks(space..n),
                cur.blocks(0..n - space),
                &buffer.lut_prefix,
                &mut buffer.apply,
                n - space,
            );
            std::mem::swap(&mut cur, &mut next);
            space *= 2;
        }

        // 3. The most significant block's resolved state is the operation's
        // flag; capture it before the rotation discards it, then turn
        // "carry produced by block i" into "carry into block i" by rotating
        // right into a zeroed slot for block 0.
        let mut flag_blocks =
            DeviceLweCiphertextList::new(stream, params.big_lwe_dimension(), 1);
        flag_blocks.copy_blocks_async(0, cur, n - 1..n, stream);
        self.rotate_blocks_right_async(streams, &mut buffer.resolved, cur, 1);
        buffer.resolved.zero_blocks_async(0..1, stream);

        // 4. Fold the incoming carries (borrows) into the raw sums.
        let size = ct.d_blocks.lwe_size();
        ct.d_blocks
            .as_flat_mut()
            .par_chunks_exact_mut(size)
            .zip(buffer.resolved.as_flat().par_chunks_exact(size))
            .for_each(|(block, incoming)| {
                for (scalar, &flag) in block.iter_mut().zip(incoming) {
                    *scalar = match kind {
                        PropagationKind::Carry => scalar.wrapping_add(flag),
                        PropagationKind::Borrow => scalar.wrapping_sub(flag),
                    };
                }
            });

        // 5. Fold residual carry bits back into range and discard the carry
        // digit.
        self.apply_univariate_lut_assign_async(
            streams,
            ct,
            &buffer.lut_message_extract,
            &mut buffer.apply,
        );

        DeviceBooleanBlock::new_unchecked(DeviceRadixCiphertext {
            d_blocks: flag_blocks,
            info: RadixCiphertextInfo {
                blocks: vec![block_info_for(params, Degree::new(1))],
            },
        })
    }
}
